//! Conversion of page content blocks into Markdown, so API-backed records go
//! through the same renderer as files.

use crate::source::RichText;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bulleted,
    Numbered,
}

/// Render a page's top-level blocks as Markdown. Nested children are not
/// fetched, and block types without a Markdown equivalent are skipped.
pub fn to_markdown(blocks: &[Value]) -> String {
    let mut out = String::new();
    let mut prev_list: Option<ListKind> = None;
    let mut number = 0;

    for block in blocks {
        let kind = block["type"].as_str().unwrap_or_default();
        let content = &block[kind];
        let text = || escape_block_start(&inline(&spans(&content["rich_text"])));

        let (piece, list) = match kind {
            "paragraph" => (text(), None),
            "heading_1" => (format!("# {}", text()), None),
            "heading_2" => (format!("## {}", text()), None),
            "heading_3" => (format!("### {}", text()), None),
            "bulleted_list_item" => (format!("- {}", text()), Some(ListKind::Bulleted)),
            "to_do" => {
                let mark = if content["checked"].as_bool().unwrap_or(false) {
                    'x'
                } else {
                    ' '
                };
                (format!("- [{mark}] {}", text()), Some(ListKind::Bulleted))
            }
            "numbered_list_item" => {
                number = if prev_list == Some(ListKind::Numbered) {
                    number + 1
                } else {
                    1
                };
                (format!("{number}. {}", text()), Some(ListKind::Numbered))
            }
            "quote" => (quote(&text()), None),
            "code" => (code(content), None),
            "divider" => ("---".to_string(), None),
            "image" => match image(content) {
                Some(md) => (md, None),
                None => continue,
            },
            other => {
                debug!(kind = other, "skipping unsupported block");
                continue;
            }
        };

        if !out.is_empty() {
            let same_list = list.is_some() && list == prev_list;
            out.push_str(if same_list { "\n" } else { "\n\n" });
        }
        out.push_str(&piece);
        prev_list = list;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn spans(value: &Value) -> Vec<RichText> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn plain(spans: &[RichText]) -> String {
    spans.iter().map(|s| s.plain_text.as_str()).collect()
}

/// Render rich text spans as inline Markdown, keeping their annotations.
fn inline(spans: &[RichText]) -> String {
    let mut out = String::new();
    for span in spans {
        let text = &span.plain_text;
        let core = text.trim();
        if core.is_empty() {
            out.push_str(text);
            continue;
        }
        let lead = &text[..text.len() - text.trim_start().len()];
        let trail = &text[text.trim_end().len()..];

        let ann = &span.annotations;
        let mut md = if ann.code {
            code_span(core)
        } else {
            escape(core)
        };
        if ann.strikethrough {
            md = format!("~~{md}~~");
        }
        if ann.italic {
            md = format!("*{md}*");
        }
        if ann.bold {
            md = format!("**{md}**");
        }
        if let Some(href) = &span.href {
            md = format!("[{md}](<{href}>)");
        }

        out.push_str(lead);
        out.push_str(&md);
        out.push_str(trail);
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '>' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a leading marker on each line that would otherwise start a heading,
/// list, or thematic break.
fn escape_block_start(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let rest = line.trim_start();
            let indent = &line[..line.len() - rest.len()];
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if rest.starts_with(['#', '-', '+', '=']) {
                format!("{indent}\\{rest}")
            } else if digits > 0 && rest[digits..].starts_with(['.', ')']) {
                format!("{indent}{}\\{}", &rest[..digits], &rest[digits..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn code_span(text: &str) -> String {
    if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn code(content: &Value) -> String {
    let language = content["language"]
        .as_str()
        .filter(|l| *l != "plain text")
        .unwrap_or_default();
    let source = plain(&spans(&content["rich_text"]));
    let fence = if source.contains("```") { "~~~~" } else { "```" };
    format!("{fence}{language}\n{}\n{fence}", source.trim_end_matches('\n'))
}

fn image(content: &Value) -> Option<String> {
    let kind = content["type"].as_str()?;
    let url = content[kind]["url"].as_str()?;
    let caption = plain(&spans(&content["caption"]));
    Some(format!("![{}](<{url}>)", escape(&caption)))
}
