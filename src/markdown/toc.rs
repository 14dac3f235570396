use crate::model::TocEntry;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)<h([1-3])(\s[^>]*)?>(.*?)</h([1-6])\s*>").expect("valid heading regex")
});
static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)id\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid id regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Slugify a string and append it to a buffer. Every run of characters that
/// aren't alphanumeric or `_` turns into a single `-`.
fn slug_append(buf: &mut String, s: &str) {
    let mut last_is_dash = buf.ends_with('-');
    for c in s.chars() {
        if c.is_alphanumeric() || c == '_' {
            last_is_dash = false;
            buf.extend(c.to_lowercase());
        } else if !last_is_dash {
            last_is_dash = true;
            buf.push('-');
        }
    }
}

/// Id for headings whose text has no word characters.
const FALLBACK_ID: &str = "section";

/// Derive an anchor id from a heading's visible text.
pub fn heading_id(text: &str) -> String {
    let mut slug = String::new();
    slug_append(&mut slug, text);
    if slug.chars().all(|c| c == '-') {
        return FALLBACK_ID.to_string();
    }
    slug
}

/// Hands out ids, suffixing `-2`, `-3`, ... when an id was already used
/// earlier in the same document.
#[derive(Default)]
struct IdAllocator {
    taken: HashSet<String>,
}

impl IdAllocator {
    fn claim(&mut self, id: &str) {
        self.taken.insert(id.to_string());
    }

    fn allocate(&mut self, base: String) -> String {
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// The heading elements found in a fragment, before ids are assigned.
struct Heading {
    level: u8,
    /// Byte offset just past `<hN`, where an `id` attribute can be inserted.
    insert_at: usize,
    existing_id: Option<String>,
    text: String,
}

fn scan(html: &str) -> Vec<Heading> {
    HEADING
        .captures_iter(html)
        .filter(|caps| caps[1] == caps[4])
        .map(|caps| {
            let whole = caps.get(0).expect("match has a whole group");
            let level: u8 = caps[1].parse().expect("regex only matches digits");
            let existing_id = caps.get(2).and_then(|attrs| {
                let id = ID_ATTR.captures(attrs.as_str())?;
                let value = id.get(1).or_else(|| id.get(2))?.as_str();
                (!value.is_empty()).then(|| value.to_string())
            });
            Heading {
                level,
                insert_at: whole.start() + 3,
                existing_id,
                text: visible_text(&caps[3]),
            }
        })
        .collect()
}

/// Strip tags from an HTML snippet and decode the basic entities.
fn visible_text(inner: &str) -> String {
    let stripped = TAG.replace_all(inner, "");
    decode_entities(stripped.trim())
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Give every level 1-3 heading in an HTML fragment an `id` and collect the
/// table of contents in document order.
///
/// Headings that already carry an id keep it. Nothing else in the fragment is
/// changed.
pub fn build_toc(html: &str) -> (String, Vec<TocEntry>) {
    let headings = scan(html);
    if headings.is_empty() {
        return (html.to_string(), vec![]);
    }

    let mut ids = IdAllocator::default();
    for id in headings.iter().filter_map(|h| h.existing_id.as_deref()) {
        ids.claim(id);
    }

    let mut annotated = String::with_capacity(html.len() + headings.len() * 16);
    let mut toc = Vec::with_capacity(headings.len());
    let mut copied = 0;
    for heading in headings {
        let id = match heading.existing_id {
            Some(id) => id,
            None => {
                let id = ids.allocate(heading_id(&heading.text));
                annotated.push_str(&html[copied..heading.insert_at]);
                annotated.push_str(&format!(" id=\"{id}\""));
                copied = heading.insert_at;
                id
            }
        };
        toc.push(TocEntry {
            level: heading.level,
            id,
            text: heading.text,
        });
    }
    annotated.push_str(&html[copied..]);

    (annotated, toc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: u8, id: &str, text: &str) -> TocEntry {
        TocEntry {
            level,
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn no_headings() {
        let html = "<p>hi</p>\n";
        assert_eq!(build_toc(html), (html.to_string(), vec![]));
    }

    #[test]
    fn simple_header() {
        let (html, toc) = build_toc("<h1>hi</h1>\n");
        assert_eq!(html, "<h1 id=\"hi\">hi</h1>\n");
        assert_eq!(toc, vec![entry(1, "hi", "hi")]);
    }

    #[test]
    fn document_order() {
        let (_, toc) = build_toc("<h1>Intro</h1><p>a</p><h2>Setup</h2><h1>Conclusion</h1>");
        assert_eq!(
            toc,
            vec![
                entry(1, "intro", "Intro"),
                entry(2, "setup", "Setup"),
                entry(1, "conclusion", "Conclusion"),
            ]
        );
    }

    #[test]
    fn header_with_id() {
        let source = "<h2 id=\"x\">hi</h2>";
        let (html, toc) = build_toc(source);
        assert_eq!(html, source);
        assert_eq!(toc, vec![entry(2, "x", "hi")]);
    }

    #[test]
    fn style() {
        let (html, toc) = build_toc("<h1><em>hi</em> there</h1>");
        assert_eq!(html, "<h1 id=\"hi-there\"><em>hi</em> there</h1>");
        assert_eq!(toc, vec![entry(1, "hi-there", "hi there")]);
    }

    #[test]
    fn punctuation() {
        assert_eq!(heading_id("h'i"), "h-i");
    }

    #[test]
    fn multi_gap() {
        assert_eq!(heading_id("h ' i"), "h-i");
    }

    #[test]
    fn trailing_punctuation_keeps_dash() {
        assert_eq!(heading_id("What's new?"), "what-s-new-");
    }

    #[test]
    fn underscore_is_a_word_character() {
        assert_eq!(heading_id("snake_case Name"), "snake_case-name");
    }

    #[test]
    fn wordless_headings_get_fallback_id() {
        assert_eq!(heading_id(""), "section");
        assert_eq!(heading_id("???"), "section");

        let (html, toc) = build_toc("<h1></h1>\n<h1>???</h1>\n<h1>???</h1>\n");
        assert_eq!(
            html,
            "<h1 id=\"section\"></h1>\n<h1 id=\"section-2\">???</h1>\n<h1 id=\"section-3\">???</h1>\n"
        );
        let ids: Vec<_> = toc.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["section", "section-2", "section-3"]);
    }

    #[test]
    fn entities_decoded_in_text() {
        let (_, toc) = build_toc("<h3>Tom &amp; Jerry</h3>");
        assert_eq!(toc, vec![entry(3, "tom-jerry", "Tom & Jerry")]);
    }

    #[test]
    fn collisions_get_suffixes() {
        let (html, toc) = build_toc("<h2>Notes</h2><h2>Notes</h2><h2>Notes</h2>");
        assert_eq!(
            html,
            "<h2 id=\"notes\">Notes</h2><h2 id=\"notes-2\">Notes</h2><h2 id=\"notes-3\">Notes</h2>"
        );
        let ids: Vec<_> = toc.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["notes", "notes-2", "notes-3"]);
    }

    #[test]
    fn explicit_id_is_reserved() {
        let (_, toc) = build_toc("<h2>Setup</h2><h2 id=\"setup\">Other</h2>");
        let ids: Vec<_> = toc.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["setup-2", "setup"]);
    }

    #[test]
    fn deeper_headings_untouched() {
        let source = "<h4>deep</h4><header>x</header>";
        assert_eq!(build_toc(source), (source.to_string(), vec![]));
    }

    #[test]
    fn other_attributes_kept() {
        let (html, _) = build_toc("<h2 class=\"lead\">A B</h2>");
        assert_eq!(html, "<h2 id=\"a-b\" class=\"lead\">A B</h2>");
    }

    #[test]
    fn data_id_is_not_an_id() {
        let (html, toc) = build_toc("<h1 data-id=\"q\">Hi</h1>");
        assert_eq!(html, "<h1 id=\"hi\" data-id=\"q\">Hi</h1>");
        assert_eq!(toc[0].id, "hi");
    }
}
