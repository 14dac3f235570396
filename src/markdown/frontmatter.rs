use serde_json::{Map, Value};
use tracing::warn;

/// A document split into its leading metadata block and its body.
///
/// `block` is the verbatim text of the metadata block including both
/// delimiter lines, so `block + body` always reproduces the input exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter<'a> {
    pub metadata: Map<String, Value>,
    pub block: &'a str,
    pub body: &'a str,
}

/// Split a raw document into YAML frontmatter and body text.
///
/// The block must open on the very first line with `---` and close with a
/// line that is exactly `---` or `...`. Without a complete block, the metadata
/// is empty and the whole input is the body. A block that isn't a valid YAML
/// mapping is still stripped, but yields empty metadata.
pub fn parse(source: &str) -> Frontmatter<'_> {
    let Some(split) = find_block_end(source) else {
        return Frontmatter {
            metadata: Map::new(),
            block: "",
            body: source,
        };
    };

    let (block, body) = source.split_at(split.block_end);
    let yaml = &source[split.yaml_start..split.yaml_end];
    Frontmatter {
        metadata: parse_metadata(yaml),
        block,
        body,
    }
}

struct BlockSplit {
    yaml_start: usize,
    yaml_end: usize,
    block_end: usize,
}

/// Locate the frontmatter block by walking lines, keeping byte offsets so that
/// line endings are never touched.
fn find_block_end(source: &str) -> Option<BlockSplit> {
    let mut lines = source.split_inclusive('\n');
    let first = lines.next()?;
    if trim_eol(first) != "---" {
        return None;
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        let delim = trim_eol(line);
        if delim == "---" || delim == "..." {
            return Some(BlockSplit {
                yaml_start,
                yaml_end: offset,
                block_end: offset + line.len(),
            });
        }
        offset += line.len();
    }

    // Unclosed block.
    None
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r']).trim_end()
}

fn parse_metadata(yaml: &str) -> Map<String, Value> {
    if yaml.trim().is_empty() {
        return Map::new();
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(kind = value_kind(&other), "frontmatter is not a mapping; ignoring it");
            Map::new()
        }
        Err(e) => {
            warn!(error = %e, "invalid YAML in frontmatter; ignoring it");
            Map::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_frontmatter() {
        let fm = parse("# hi\n\nthere");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.block, "");
        assert_eq!(fm.body, "# hi\n\nthere");
    }

    #[test]
    fn simple() {
        let fm = parse("---\ntitle: Hello\ntags: [A, B]\n---\n# Hi\n");
        assert_eq!(fm.metadata["title"], json!("Hello"));
        assert_eq!(fm.metadata["tags"], json!(["A", "B"]));
        assert_eq!(fm.body, "# Hi\n");
    }

    #[test]
    fn nested_list_and_bool() {
        let fm = parse("---\nfeatured: true\ntags:\n  - rust\n  - web\n---\nbody");
        assert_eq!(fm.metadata["featured"], json!(true));
        assert_eq!(fm.metadata["tags"], json!(["rust", "web"]));
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn round_trip_keeps_body_bytes() {
        let source = "---\r\ntitle: x\r\n---\r\n\r\n  indented\r\ntrailing  \n\n";
        let fm = parse(source);
        assert_eq!(fm.metadata["title"], json!("x"));
        assert_eq!(fm.body, "\r\n  indented\r\ntrailing  \n\n");
        assert_eq!(format!("{}{}", fm.block, fm.body), source);
    }

    #[test]
    fn dots_close_block() {
        let fm = parse("---\na: 1\n...\nrest");
        assert_eq!(fm.metadata["a"], json!(1));
        assert_eq!(fm.body, "rest");
    }

    #[test]
    fn unclosed_is_body() {
        let source = "---\ntitle: x\nno end";
        let fm = parse(source);
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, source);
    }

    #[test]
    fn empty_block() {
        let fm = parse("---\n---\nbody");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.block, "---\n---\n");
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn invalid_yaml_is_stripped() {
        let fm = parse("---\ntitle: [unclosed\n---\nbody");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn scalar_yaml_is_ignored() {
        let fm = parse("---\njust a string\n---\nbody");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn rule_later_in_document_is_not_frontmatter() {
        let source = "intro\n---\nmore";
        assert_eq!(parse(source).body, source);
    }
}
