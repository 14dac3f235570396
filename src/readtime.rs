/// Average adult reading speed used for every estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Estimate how many minutes it takes to read some plain text. Always at
/// least one minute.
pub fn estimate(plain_text: &str) -> u32 {
    let words = plain_text.split_whitespace().count();
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round() as u32;
    minutes.max(1)
}

/// A stand-in estimate for items listed without their body. It depends only
/// on the slug, so an item shows the same number on every listing.
pub fn placeholder(slug: &str) -> u32 {
    let n = (slug.chars().count() % 10) as u32;
    (n + 5).max(5)
}
