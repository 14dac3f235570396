pub mod files;
pub mod github;
mod http;
pub mod notion;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use files::FileSource;
pub use github::GithubSource;
pub use notion::NotionSource;

/// The content collections a site has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Articles,
    Projects,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Articles => "articles",
            Collection::Projects => "projects",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCollection(pub String);

impl fmt::Display for UnknownCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown collection `{}`", self.0)
    }
}

impl std::error::Error for UnknownCollection {}

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "articles" | "blogs" => Ok(Collection::Articles),
            "projects" => Ok(Collection::Projects),
            _ => Err(UnknownCollection(s.to_string())),
        }
    }
}

/// A record as it comes out of a backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    File(FileRecord),
    Api(ApiRecord),
}

impl RawRecord {
    /// The markdown body, if this record was loaded with one.
    pub fn body(&self) -> Option<&str> {
        match self {
            RawRecord::File(r) => Some(&r.body),
            RawRecord::Api(r) => r.body.as_deref(),
        }
    }
}

/// A Markdown file (or project folder) from the content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// The file stem or folder name.
    pub slug: String,
    pub frontmatter: Map<String, Value>,
    pub body: String,
    /// Last modification time of the source file.
    pub modified: Option<DateTime<Utc>>,
    /// Directory holding the record, relative to the content root. Relative
    /// image paths in the frontmatter are resolved against it.
    pub asset_dir: Option<String>,
}

impl FileRecord {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.frontmatter
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The frontmatter `date`, falling back to the file's modification time.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        ["date", "created_time"]
            .iter()
            .find_map(|key| self.str_field(key).and_then(parse_date))
            .or(self.modified)
    }
}

/// Parse the date formats people write in frontmatter: RFC 3339 timestamps
/// and plain `YYYY-MM-DD` dates.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// A page from the remote content API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRecord {
    pub id: String,
    pub properties: IndexMap<String, TypedProperty>,
    pub cover: Option<ImageRef>,
    pub icon: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    /// Page content converted to Markdown. Only fetched for single records.
    pub body: Option<String>,
}

/// One typed page property. The tag decides how a plain value is read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedProperty {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichText>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    Url {
        #[serde(default)]
        url: Option<String>,
    },
    Checkbox {
        #[serde(default)]
        checkbox: bool,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    #[serde(other)]
    Unsupported,
}

impl TypedProperty {
    /// Concatenated plain text of a title or rich text property.
    pub fn plain_text(&self) -> Option<String> {
        match self {
            TypedProperty::Title { title: spans } | TypedProperty::RichText { rich_text: spans } => {
                Some(spans.iter().map(|s| s.plain_text.as_str()).collect())
            }
            TypedProperty::Select { select } => select.as_ref().map(|s| s.name.clone()),
            TypedProperty::Url { url } => url.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageRef {
    External { external: FileUrl },
    File { file: FileUrl },
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::External { external } => &external.url,
            ImageRef::File { file } => &file.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileUrl {
    pub url: String,
}

/// A backend that content records are read from.
///
/// Implementations must return records in the collection's canonical order:
/// articles newest first, projects by title.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn list_records(&self, collection: Collection) -> Result<Vec<RawRecord>>;

    /// Fails with `Error::NotFound` when the slug doesn't resolve.
    async fn get_record(&self, collection: Collection, slug: &str) -> Result<RawRecord>;
}
