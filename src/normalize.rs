//! Reshaping raw backend records into the uniform `ContentItem`.
//!
//! Each field has its own extractor with one arm per backend, so the
//! knowledge of how properties are shaped stays in this module.

use crate::error::{Error, Result};
use crate::markdown;
use crate::model::{ContentItem, Link, LinkKind};
use crate::readtime;
use crate::source::{ApiRecord, FileRecord, RawRecord, TypedProperty};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// How much of a record is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// Listing context: read time is a placeholder and the body is dropped.
    Listing,
    /// Fully loaded: read time comes from the body.
    Full,
}

/// Site-wide values used when a record doesn't provide its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub cover: String,
    /// API property holding the slug. Records without one use their id.
    pub slug_property: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cover: "/defaultproject.jpeg".into(),
            slug_property: "Slug".into(),
        }
    }
}

/// Frontmatter keys that hold images, never links.
const IMAGE_KEYS: &[&str] = &["cover", "coverImage", "screenshots", "image", "icon"];

pub fn normalize(raw: &RawRecord, detail: Detail, defaults: &Defaults) -> Result<ContentItem> {
    let (id, slug) = identity(raw, defaults)?;
    let body = match detail {
        Detail::Full => raw.body().filter(|b| !b.trim().is_empty()),
        Detail::Listing => None,
    };
    let read_time_minutes = match body {
        Some(body) => readtime::estimate(&markdown::plain_text(body)),
        None => readtime::placeholder(&slug),
    };

    Ok(ContentItem {
        title: title(raw).unwrap_or_else(|| slug.clone()),
        description: description(raw).unwrap_or_default(),
        cover_image: cover(raw).unwrap_or_else(|| defaults.cover.clone()),
        tags: dedup(tags(raw)),
        featured: featured(raw).unwrap_or(false),
        date: date(raw).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        read_time_minutes,
        links: dedup_links(links(raw)),
        section: section(raw),
        icon: icon(raw),
        body: body.map(String::from),
        id,
        slug,
    })
}

fn identity(raw: &RawRecord, defaults: &Defaults) -> Result<(String, String)> {
    match raw {
        RawRecord::File(r) => {
            let slug = r.slug.trim();
            if slug.is_empty() {
                return Err(Error::MalformedRecord("file record without a slug".into()));
            }
            let id = r.str_field("id").unwrap_or(slug);
            Ok((id.to_string(), slug.to_string()))
        }
        RawRecord::Api(r) => {
            let id = r.id.trim();
            if id.is_empty() {
                return Err(Error::MalformedRecord("page without an id".into()));
            }
            let slug = r
                .properties
                .get(&defaults.slug_property)
                .and_then(TypedProperty::plain_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let slug = match slug {
                Some(s) if is_url_safe(&s) => s,
                Some(s) => {
                    debug!(id, slug = %s, "slug is not URL-safe; using the page id");
                    id.to_string()
                }
                None => id.to_string(),
            };
            Ok((id.to_string(), slug))
        }
    }
}

/// ASCII letters, digits, `-` and `_` only.
fn is_url_safe(slug: &str) -> bool {
    slug.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn title(raw: &RawRecord) -> Option<String> {
    let title = match raw {
        RawRecord::File(r) => r.str_field("title").map(String::from),
        RawRecord::Api(r) => r
            .properties
            .values()
            .find(|p| matches!(p, TypedProperty::Title { .. }))
            .and_then(TypedProperty::plain_text),
    };
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn description(raw: &RawRecord) -> Option<String> {
    match raw {
        RawRecord::File(r) => r.str_field("description").map(String::from),
        RawRecord::Api(r) => match api_property(r, "description")? {
            p @ TypedProperty::RichText { .. } => p.plain_text(),
            _ => None,
        },
    }
}

fn cover(raw: &RawRecord) -> Option<String> {
    match raw {
        RawRecord::File(r) => {
            let path = r.str_field("cover").or_else(|| r.str_field("coverImage")).or_else(|| {
                r.frontmatter
                    .get("screenshots")?
                    .as_array()?
                    .iter()
                    .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
            })?;
            Some(resolve_asset(r, path))
        }
        RawRecord::Api(r) => r
            .cover
            .as_ref()
            .map(|c| c.url().trim().to_string())
            .filter(|u| !u.is_empty()),
    }
}

/// Point a relative image path at the image route for the record's folder.
fn resolve_asset(record: &FileRecord, path: &str) -> String {
    if path.starts_with('/') || is_http(path) {
        return path.to_string();
    }
    let path = path.trim_start_matches("./");
    match &record.asset_dir {
        Some(dir) => format!("/images/{dir}/{path}"),
        None => format!("/images/{path}"),
    }
}

fn tags(raw: &RawRecord) -> Vec<String> {
    match raw {
        RawRecord::File(r) => ["tags", "technologies"]
            .iter()
            .find_map(|key| r.frontmatter.get(*key))
            .map(string_list)
            .unwrap_or_default(),
        RawRecord::Api(r) => {
            let prop = api_property(r, "tags")
                .filter(|p| matches!(p, TypedProperty::MultiSelect { .. }))
                .or_else(|| {
                    r.properties
                        .values()
                        .find(|p| matches!(p, TypedProperty::MultiSelect { .. }))
                });
            match prop {
                Some(TypedProperty::MultiSelect { multi_select }) => {
                    multi_select.iter().map(|o| o.name.clone()).collect()
                }
                _ => vec![],
            }
        }
    }
}

/// A frontmatter value that is either a list of strings or a single string.
fn string_list(value: &Value) -> Vec<String> {
    let items: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => vec![s.as_str()],
        _ => vec![],
    };
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn links(raw: &RawRecord) -> Vec<Link> {
    match raw {
        RawRecord::File(r) => file_links(r),
        RawRecord::Api(r) => r
            .properties
            .iter()
            .filter_map(|(name, prop)| match prop {
                TypedProperty::Url { url: Some(url) } if !url.trim().is_empty() => {
                    Some(named_link(name, url.trim()))
                }
                _ => None,
            })
            .collect(),
    }
}

fn file_links(record: &FileRecord) -> Vec<Link> {
    let mut links = vec![];
    match record.frontmatter.get("links") {
        Some(Value::Array(entries)) => links.extend(entries.iter().filter_map(link_entry)),
        Some(Value::Object(map)) => links.extend(map.iter().filter_map(|(name, url)| {
            let url = url.as_str()?.trim();
            (!url.is_empty()).then(|| named_link(name, url))
        })),
        _ => (),
    }
    for (key, value) in &record.frontmatter {
        if IMAGE_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(url) = value.as_str().map(str::trim).filter(|s| is_http(s)) {
            links.push(named_link(key, url));
        }
    }
    links
}

/// One entry of a `links` list: `{type, url, label}` with everything but the
/// url optional.
fn link_entry(entry: &Value) -> Option<Link> {
    let url = entry["url"].as_str()?.trim();
    if url.is_empty() {
        return None;
    }
    let label = entry["label"].as_str().map(str::trim).filter(|l| !l.is_empty());
    let kind = entry["type"].as_str().and_then(LinkKind::parse);
    let name = label.or(entry["type"].as_str()).unwrap_or(url);
    Some(Link {
        kind: kind.unwrap_or_else(|| LinkKind::classify(name)),
        url: url.to_string(),
        label: link_label(name),
    })
}

fn named_link(name: &str, url: &str) -> Link {
    Link {
        kind: LinkKind::classify(name),
        url: url.to_string(),
        label: link_label(name),
    }
}

fn link_label(name: &str) -> String {
    name.strip_suffix(" Link").unwrap_or(name).to_string()
}

fn featured(raw: &RawRecord) -> Option<bool> {
    match raw {
        RawRecord::File(r) => r.frontmatter.get("featured")?.as_bool(),
        RawRecord::Api(r) => match api_property(r, "featured")? {
            TypedProperty::Checkbox { checkbox } => Some(*checkbox),
            _ => None,
        },
    }
}

fn date(raw: &RawRecord) -> Option<DateTime<Utc>> {
    match raw {
        RawRecord::File(r) => r.date(),
        RawRecord::Api(r) => r.created_time,
    }
}

fn section(raw: &RawRecord) -> Option<String> {
    let section = match raw {
        RawRecord::File(r) => r.str_field("section").map(String::from),
        RawRecord::Api(r) => match api_property(r, "section")? {
            p @ (TypedProperty::Select { .. } | TypedProperty::RichText { .. }) => p.plain_text(),
            _ => None,
        },
    };
    section.filter(|s| !s.is_empty())
}

fn icon(raw: &RawRecord) -> Option<String> {
    match raw {
        RawRecord::File(r) => r.str_field("icon").map(String::from),
        RawRecord::Api(r) => r.icon.clone(),
    }
}

/// Look up an API property by name, ignoring case.
fn api_property<'a>(record: &'a ApiRecord, name: &str) -> Option<&'a TypedProperty> {
    record
        .properties
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, prop)| prop)
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn dedup_links(links: Vec<Link>) -> Vec<Link> {
    let mut out: Vec<Link> = Vec::with_capacity(links.len());
    for link in links {
        if !out.iter().any(|l| l.url == link.url) {
            out.push(link);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileUrl, ImageRef, RichText, SelectOption};
    use indexmap::IndexMap;
    use serde_json::{Map, json};

    fn file(slug: &str, frontmatter: Value, body: &str) -> RawRecord {
        let Value::Object(frontmatter) = frontmatter else {
            panic!("frontmatter must be an object");
        };
        RawRecord::File(FileRecord {
            slug: slug.into(),
            frontmatter,
            body: body.into(),
            modified: None,
            asset_dir: Some(format!("projects/{slug}")),
        })
    }

    fn rich(text: &str) -> Vec<RichText> {
        vec![RichText {
            plain_text: text.into(),
            ..RichText::default()
        }]
    }

    fn api(id: &str, properties: Vec<(&str, TypedProperty)>) -> RawRecord {
        RawRecord::Api(ApiRecord {
            id: id.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<IndexMap<_, _>>(),
            cover: None,
            icon: None,
            created_time: None,
            body: None,
        })
    }

    #[test]
    fn missing_fields_default() {
        let item = normalize(&file("bare", json!({}), ""), Detail::Listing, &Defaults::default())
            .unwrap();
        assert_eq!(item.id, "bare");
        assert_eq!(item.title, "bare");
        assert_eq!(item.description, "");
        assert_eq!(item.cover_image, "/defaultproject.jpeg");
        assert!(item.tags.is_empty());
        assert!(!item.featured);
        assert_eq!(item.date, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(item.read_time_minutes, 9);
        assert!(item.links.is_empty());
        assert_eq!(item.body, None);
    }

    #[test]
    fn configured_default_cover() {
        let defaults = Defaults {
            cover: "/fallback.png".into(),
            ..Defaults::default()
        };
        let item = normalize(&file("x", json!({}), ""), Detail::Listing, &defaults).unwrap();
        assert_eq!(item.cover_image, "/fallback.png");
    }

    #[test]
    fn idempotent() {
        let raw = file(
            "rocket",
            json!({"title": "Rocket", "tags": ["a", "b"], "github": "https://github.com/x/y"}),
            "Some words here.",
        );
        let defaults = Defaults::default();
        assert_eq!(
            normalize(&raw, Detail::Full, &defaults).unwrap(),
            normalize(&raw, Detail::Full, &defaults).unwrap()
        );
    }

    #[test]
    fn file_fields() {
        let raw = file(
            "rocket",
            json!({
                "title": "  Rocket  ",
                "description": "Goes up.",
                "date": "2024-05-06",
                "technologies": ["Rust", "Tokio", "Rust"],
                "screenshots": ["shot.png"],
                "featured": true,
                "section": "Systems",
                "links": [
                    {"type": "live", "url": "https://rocket.dev", "label": "Website"},
                    {"url": "https://docs.rocket.dev", "label": "Docs"}
                ],
                "GitHub Link": "https://github.com/x/rocket",
                "homepage": "https://rocket.dev"
            }),
            "",
        );
        let item = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(item.title, "Rocket");
        assert_eq!(item.description, "Goes up.");
        assert_eq!(item.date.to_rfc3339(), "2024-05-06T00:00:00+00:00");
        assert_eq!(item.tags, ["Rust", "Tokio"]);
        assert_eq!(item.cover_image, "/images/projects/rocket/shot.png");
        assert!(item.featured);
        assert_eq!(item.section.as_deref(), Some("Systems"));
        assert_eq!(
            item.links,
            vec![
                Link {
                    kind: LinkKind::Live,
                    url: "https://rocket.dev".into(),
                    label: "Website".into()
                },
                Link {
                    kind: LinkKind::Documentation,
                    url: "https://docs.rocket.dev".into(),
                    label: "Docs".into()
                },
                Link {
                    kind: LinkKind::Github,
                    url: "https://github.com/x/rocket".into(),
                    label: "GitHub".into()
                },
            ]
        );
    }

    #[test]
    fn absolute_cover_kept() {
        let raw = file("x", json!({"cover": "https://cdn/x.png"}), "");
        let item = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(item.cover_image, "https://cdn/x.png");
    }

    #[test]
    fn single_string_tags() {
        let raw = file("x", json!({"tags": "solo"}), "");
        let item = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(item.tags, ["solo"]);
    }

    #[test]
    fn full_detail_reads_body() {
        let body = "word ".repeat(400);
        let raw = file("x", json!({}), &body);
        let item = normalize(&raw, Detail::Full, &Defaults::default()).unwrap();
        assert_eq!(item.read_time_minutes, 2);
        assert_eq!(item.body.as_deref(), Some(body.as_str()));

        let listed = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(listed.read_time_minutes, readtime::placeholder("x"));
        assert_eq!(listed.body, None);
    }

    #[test]
    fn api_fields() {
        let mut raw = api(
            "59833787",
            vec![
                ("Name", TypedProperty::Title { title: rich("Rocket") }),
                ("Slug", TypedProperty::RichText { rich_text: rich("rocket") }),
                (
                    "Description",
                    TypedProperty::RichText {
                        rich_text: rich("Goes up."),
                    },
                ),
                (
                    "Tags",
                    TypedProperty::MultiSelect {
                        multi_select: vec![
                            SelectOption { name: "Rust".into() },
                            SelectOption { name: "rust".into() },
                            SelectOption { name: "Rust".into() },
                        ],
                    },
                ),
                (
                    "GitHub Link",
                    TypedProperty::Url {
                        url: Some("https://github.com/x/rocket".into()),
                    },
                ),
                (
                    "Live Demo",
                    TypedProperty::Url {
                        url: Some("https://rocket.dev".into()),
                    },
                ),
                ("Docs", TypedProperty::Url { url: None }),
                ("Featured", TypedProperty::Checkbox { checkbox: true }),
            ],
        );
        if let RawRecord::Api(r) = &mut raw {
            r.cover = Some(ImageRef::External {
                external: FileUrl {
                    url: "https://img/cover.png".into(),
                },
            });
        }
        let item = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(item.id, "59833787");
        assert_eq!(item.slug, "rocket");
        assert_eq!(item.title, "Rocket");
        assert_eq!(item.description, "Goes up.");
        assert_eq!(item.cover_image, "https://img/cover.png");
        assert_eq!(item.tags, ["Rust", "rust"]);
        assert!(item.featured);
        let kinds: Vec<_> = item.links.iter().map(|l| (l.kind, l.label.as_str())).collect();
        assert_eq!(
            kinds,
            [(LinkKind::Github, "GitHub"), (LinkKind::Live, "Live Demo")]
        );
    }

    #[test]
    fn api_slug_defaults_to_id() {
        let raw = api("abc", vec![]);
        let item = normalize(&raw, Detail::Listing, &Defaults::default()).unwrap();
        assert_eq!(item.slug, "abc");
        assert_eq!(item.title, "abc");
    }

    #[test]
    fn api_slug_must_be_url_safe() {
        let slug = |text: &str| {
            let raw = api("abc-123", vec![("Slug", TypedProperty::RichText { rich_text: rich(text) })]);
            normalize(&raw, Detail::Listing, &Defaults::default())
                .unwrap()
                .slug
        };
        assert_eq!(slug("my-post_2"), "my-post_2");
        assert_eq!(slug("  my-post  "), "my-post");
        assert_eq!(slug("My Post"), "abc-123");
        assert_eq!(slug("a/b"), "abc-123");
        assert_eq!(slug("café"), "abc-123");
    }

    #[test]
    fn missing_id_is_malformed() {
        let raw = api("", vec![("Name", TypedProperty::Title { title: rich("x") })]);
        assert!(matches!(
            normalize(&raw, Detail::Listing, &Defaults::default()),
            Err(Error::MalformedRecord(_))
        ));

        let raw = RawRecord::File(FileRecord {
            slug: String::new(),
            frontmatter: Map::new(),
            body: String::new(),
            modified: None,
            asset_dir: None,
        });
        assert!(matches!(
            normalize(&raw, Detail::Listing, &Defaults::default()),
            Err(Error::MalformedRecord(_))
        ));
    }
}
