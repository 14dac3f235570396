use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The backend-agnostic display model for one article or project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub cover_image: String,
    pub tags: Vec<String>,
    pub featured: bool,
    pub date: DateTime<Utc>,
    pub read_time_minutes: u32,
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// The raw Markdown source. Only set when the item was fully loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ContentItem {
    /// A copy of this item with a different featured flag.
    pub fn with_featured(&self, featured: bool) -> Self {
        Self {
            featured,
            ..self.clone()
        }
    }

    /// A copy of this item with a different read time.
    pub fn with_read_time(&self, minutes: u32) -> Self {
        Self {
            read_time_minutes: minutes,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Github,
    Live,
    Documentation,
    External,
}

impl LinkKind {
    /// Classify a link by the name of the property it came from.
    pub fn classify(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("github") {
            Self::Github
        } else if name.contains("live") || name.contains("demo") {
            Self::Live
        } else if name.contains("doc") {
            Self::Documentation
        } else {
            Self::External
        }
    }

    /// Parse an explicit link type, as written in a file's `links` list.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "github" => Some(Self::Github),
            "live" | "demo" => Some(Self::Live),
            "documentation" | "docs" | "doc" => Some(Self::Documentation),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u8,
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub html: String,
    pub toc: Vec<TocEntry>,
}
