pub mod frontmatter;
mod sanitize;
pub mod toc;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html::push_html};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

pub use toc::build_toc;

/// Documents larger than this are shown as escaped text instead of rendered.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error("document is {len} bytes, over the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },
    #[error("markdown engine panicked")]
    Panicked,
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Render Markdown to a sanitized HTML fragment. This never fails: if
/// rendering goes wrong, the raw text comes back escaped inside `<pre>`.
pub fn render(source: &str, max_bytes: usize) -> String {
    match try_render(source, max_bytes) {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "markdown rendering failed; showing source text");
            fallback(source)
        }
    }
}

pub fn try_render(source: &str, max_bytes: usize) -> Result<String, RenderFailure> {
    if source.len() > max_bytes {
        return Err(RenderFailure::TooLarge {
            len: source.len(),
            limit: max_bytes,
        });
    }

    panic::catch_unwind(AssertUnwindSafe(|| {
        let mut html_buf = String::new();
        let iter = Parser::new_ext(source, options());
        let iter = sanitize::Sanitize::new(iter);
        push_html(&mut html_buf, iter);
        html_buf
    }))
    .map_err(|_| RenderFailure::Panicked)
}

/// The escaped-text rendering used when the real one fails.
pub fn fallback(source: &str) -> String {
    let events = [
        Event::Start(Tag::CodeBlock(CodeBlockKind::Indented)),
        Event::Text(source.into()),
        Event::End(TagEnd::CodeBlock),
    ];
    let mut buf = String::new();
    push_html(&mut buf, events.into_iter());
    buf
}

/// Extract the readable text of a Markdown document, for counting words.
pub fn plain_text(source: &str) -> String {
    let mut text = String::new();
    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Text(t) | Event::Code(t) => {
                text.push_str(&t);
                text.push(' ');
            }
            Event::SoftBreak | Event::HardBreak | Event::End(_) => text.push(' '),
            _ => (),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_default(source: &str) -> String {
        render(source, DEFAULT_MAX_DOCUMENT_BYTES)
    }

    #[test]
    fn paragraph_and_emphasis() {
        assert_eq!(
            render_default("Some **bold** text."),
            "<p>Some <strong>bold</strong> text.</p>\n"
        );
    }

    #[test]
    fn headings_are_not_given_ids_here() {
        assert_eq!(render_default("# Hi"), "<h1>Hi</h1>\n");
    }

    #[test]
    fn explicit_heading_id() {
        assert_eq!(render_default("# Hi {#top}"), "<h1 id=\"top\">Hi</h1>\n");
    }

    #[test]
    fn lists_and_code() {
        let html = render_default("- a\n- b\n\n```rust\nfn main() {}\n```\n");
        assert!(html.contains("<ul>\n<li>a</li>\n<li>b</li>\n</ul>"));
        assert!(html.contains("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        assert!(!render_default("<img src=x onerror=alert(1)>").contains("<img"));
    }

    #[test]
    fn too_large_falls_back() {
        assert_eq!(render("a <b>", 3), "<pre><code>a &lt;b&gt;</code></pre>\n");
    }

    #[test]
    fn try_render_reports_size() {
        assert!(matches!(
            try_render("abcd", 2),
            Err(RenderFailure::TooLarge { len: 4, limit: 2 })
        ));
    }

    #[test]
    fn plain_text_strips_markup() {
        let text = plain_text("# Title\n\nSome **bold** and `code`.");
        let words: Vec<_> = text.split_whitespace().collect();
        assert_eq!(words, ["Title", "Some", "bold", "and", "code", "."]);
    }

    #[test]
    fn empty_and_punctuation_headings_get_usable_ids() {
        let (html, toc) = build_toc(&render_default("#\n\n# ???\n\n# ???\n"));
        assert_eq!(
            html,
            "<h1 id=\"section\"></h1>\n<h1 id=\"section-2\">???</h1>\n<h1 id=\"section-3\">???</h1>\n"
        );
        assert!(toc.iter().all(|e| !e.id.is_empty() && !e.id.starts_with('-')));
    }
}
