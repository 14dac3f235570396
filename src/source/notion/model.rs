use crate::source::{ApiRecord, ImageRef, TypedProperty, parse_date};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One page of results from a paginated list endpoint.
#[derive(Deserialize, Debug)]
pub struct ListResp {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Parent {
    #[serde(default)]
    pub database_id: Option<String>,
}

/// A page object, read leniently: properties and images that don't decode
/// are dropped rather than failing the whole page.
#[derive(Deserialize, Debug)]
pub struct PageObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub parent: Parent,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
    #[serde(default)]
    pub cover: Option<Value>,
    #[serde(default)]
    pub icon: Option<Value>,
}

impl PageObject {
    pub fn is_live(&self) -> bool {
        !self.archived && !self.in_trash
    }

    pub fn into_record(self) -> ApiRecord {
        let properties = self
            .properties
            .into_iter()
            .map(|(name, value)| {
                let prop = serde_json::from_value(value).unwrap_or_else(|e| {
                    debug!(property = %name, error = %e, "undecodable property");
                    TypedProperty::Unsupported
                });
                (name, prop)
            })
            .collect();
        let cover = self
            .cover
            .and_then(|v| serde_json::from_value::<ImageRef>(v).ok());
        ApiRecord {
            id: self.id,
            properties,
            cover,
            icon: self.icon.as_ref().and_then(icon_text),
            created_time: self.created_time.as_deref().and_then(parse_date),
            body: None,
        }
    }
}

/// Icons are either an emoji or an image.
fn icon_text(icon: &Value) -> Option<String> {
    match icon["type"].as_str()? {
        "emoji" => icon["emoji"].as_str().map(String::from),
        kind @ ("external" | "file") => icon[kind]["url"].as_str().map(String::from),
        _ => None,
    }
}

/// Compare two page or database ids, ignoring dashes and case.
pub fn same_id(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.replace('-', "").to_ascii_lowercase();
    strip(a) == strip(b)
}

/// Whether a string has the shape of a page id: 32 hex digits, optionally
/// dashed.
pub fn looks_like_page_id(s: &str) -> bool {
    let digits = s.chars().filter(|c| *c != '-').collect::<String>();
    digits.len() == 32 && digits.chars().all(|c| c.is_ascii_hexdigit())
}
