use pulldown_cmark::{CowStr, Event, Tag};

/// A pulldown-cmark adapter that keeps author-supplied markup inert and points
/// links between items at their routes.
///
/// Raw HTML blocks and inline tags become text, so they render escaped. Link
/// and image destinations with a script-capable scheme become `#`. Relative
/// links to Markdown files lose their `.md` extension, since items are served
/// by slug: `./other-post.md#intro` becomes `./other-post#intro`.
pub struct Sanitize<I> {
    iter: I,
}

impl<'a, I> Sanitize<I>
where
    I: Iterator<Item = Event<'a>>,
{
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<'a, I> Iterator for Sanitize<I>
where
    I: Iterator<Item = Event<'a>>,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.iter.next()? {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Link {
                link_type,
                dest_url: item_route(defang(dest_url)),
                title,
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Image {
                link_type,
                dest_url: defang(dest_url),
                title,
                id,
            }),
            e => e,
        };
        Some(event)
    }
}

fn defang(url: CowStr) -> CowStr {
    if is_absolute_url(&url) {
        let scheme = url.split(':').next().unwrap_or_default();
        let scheme = scheme.trim().to_ascii_lowercase();
        if matches!(scheme.as_str(), "javascript" | "vbscript" | "data") {
            return "#".into();
        }
    }
    url
}

/// Check whether a URL is absolute, i.e., starts with a protocol.
fn is_absolute_url(url: &str) -> bool {
    let colon = url.find(':');
    let slash = url.find('/');
    match (colon, slash) {
        (Some(c), Some(s)) => c < s || (s == 0 && url.starts_with("//")),
        (Some(_), None) => true,
        (None, Some(s)) => s == 0 && url.starts_with("//"),
        (None, None) => false,
    }
}

/// Map a relative `*.md` link to the route of the item it names.
fn item_route(url: CowStr) -> CowStr {
    if is_absolute_url(&url) {
        return url;
    }
    let (path, fragment) = match url.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (&*url, None),
    };
    let Some(stem) = path.strip_suffix(".md") else {
        return url;
    };
    if stem.is_empty() || stem.ends_with('/') {
        return url;
    }
    match fragment {
        Some(f) => format!("{stem}#{f}").into(),
        None => stem.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulldown_cmark::{Parser, html};

    fn render_sanitized(source: &str) -> String {
        let mut buf = String::new();
        html::push_html(&mut buf, Sanitize::new(Parser::new(source)));
        buf
    }

    #[test]
    fn plain_markdown_unchanged() {
        assert_eq!(render_sanitized("*hi*"), "<p><em>hi</em></p>\n");
    }

    #[test]
    fn inline_html_escaped() {
        assert_eq!(
            render_sanitized("a <b>b</b>"),
            "<p>a &lt;b&gt;b&lt;/b&gt;</p>\n"
        );
    }

    #[test]
    fn script_block_escaped() {
        let html = render_sanitized("<script>alert(1)</script>\n");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn javascript_link_defanged() {
        assert_eq!(
            render_sanitized("[x](javascript:alert(1))"),
            "<p><a href=\"#\">x</a></p>\n"
        );
        assert_eq!(
            render_sanitized("[x](JavaScript:alert(1))"),
            "<p><a href=\"#\">x</a></p>\n"
        );
    }

    #[test]
    fn data_image_defanged() {
        assert_eq!(
            render_sanitized("![x](data:text/html;base64,AAAA)"),
            "<p><img src=\"#\" alt=\"x\" /></p>\n"
        );
    }

    #[test]
    fn ordinary_link_kept() {
        assert_eq!(
            render_sanitized("[x](https://example.com/notes.md)"),
            "<p><a href=\"https://example.com/notes.md\">x</a></p>\n"
        );
    }

    #[test]
    fn url_kinds() {
        assert!(is_absolute_url("http://foo.org/bar"));
        assert!(is_absolute_url("mailto:me@example.com"));
        assert!(is_absolute_url("//foo.org/bar"));
        assert!(!is_absolute_url("foo.html"));
        assert!(!is_absolute_url("/foo/bar"));
        assert!(!is_absolute_url("../bar"));
        assert!(!is_absolute_url("foo/bar//baz"));
        assert!(!is_absolute_url("foo/bar:baz"));
    }

    #[test]
    fn relative_md_link() {
        assert_eq!(
            render_sanitized("[hi](other-post.md)"),
            "<p><a href=\"other-post\">hi</a></p>\n"
        );
    }

    #[test]
    fn relative_md_link_with_fragment() {
        assert_eq!(
            render_sanitized("[hi](../projects/tool.md#usage)"),
            "<p><a href=\"../projects/tool#usage\">hi</a></p>\n"
        );
    }

    #[test]
    fn relative_md_link_refstyle() {
        assert_eq!(
            render_sanitized("[hi][h]\n\n[h]: ./bar.md"),
            "<p><a href=\"./bar\">hi</a></p>\n"
        );
    }

    #[test]
    fn relative_other_link() {
        assert_eq!(
            render_sanitized("[hi](./bar.png)"),
            "<p><a href=\"./bar.png\">hi</a></p>\n"
        );
    }
}
