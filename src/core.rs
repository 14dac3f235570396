use crate::markdown::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::source::{Collection, ContentSource, FileSource, GithubSource, NotionSource};
use anyhow::Result;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A site: the directory holding `_config.toml` and the loaded config.
pub struct Context {
    pub site_dir: PathBuf,
    pub config: Config,
}

impl Context {
    pub fn new(site_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            site_dir: site_dir.into(),
            config,
        }
    }

    /// The content root, relative paths being taken from the site directory.
    pub fn content_dir(&self) -> PathBuf {
        self.site_dir.join(&self.config.content_dir)
    }

    /// Construct the configured content backend.
    pub fn source(&self) -> Result<Arc<dyn ContentSource>> {
        Ok(match self.config.backend {
            Backend::Files => Arc::new(FileSource::new(self.content_dir())),
            Backend::Notion => Arc::new(NotionSource::from_config(&self.config.notion)?),
            Backend::Github => Arc::new(GithubSource::from_config(&self.config.github)?),
        })
    }

    /// Look up an image under the content root. Only existing files whose
    /// extension maps to an `image/*` type are served.
    pub fn resolve_image(&self, rel_path: &str) -> Option<PathBuf> {
        // Ensure that we actually have a safe, relative path fragment, and then
        // join it under the content directory.
        let rel_path = sanitize_path(rel_path)?;
        if rel_path.as_os_str().is_empty() {
            return None;
        }
        let path = self.content_dir().join(rel_path);
        if !path.is_file() {
            return None;
        }
        let mime = mime_guess::from_path(&path).first()?;
        (mime.type_() == mime_guess::mime::IMAGE).then_some(path)
    }
}

/// Should we skip a given file when reading content? We skip hidden files
/// (prefixed with .) and ones starting with _, which are special.
pub fn ignore_filename(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    (bytes != b"." && bytes.starts_with(b".")) || bytes.starts_with(b"_")
}

/// Validate and relative-ize a requested path. If we return a path, it is now
/// safe to `join` with a base directory without "escaping" that directory. May
/// return `None` for any disallowed path.
pub fn sanitize_path(path: &str) -> Option<PathBuf> {
    let mut path_buf = PathBuf::new();
    for comp in Path::new(path).components() {
        match comp {
            Component::Normal(c) => {
                if ignore_filename(c) {
                    return None;
                } else {
                    path_buf.push(c);
                }
            }
            Component::ParentDir => return None, // Disallow `..`.
            Component::Prefix(_) => return None, // Disallow `C:`.
            Component::RootDir => (),            // Strip leading `/`.
            Component::CurDir => (),             // Ignore `.`.
        }
    }

    Some(path_buf)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Files,
    Notion,
    Github,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub content_dir: PathBuf,
    /// Cover image used when a record has none.
    pub default_cover: String,
    pub bind: String,
    /// Markdown bodies larger than this render as escaped text.
    pub max_document_bytes: usize,
    pub notion: NotionConfig,
    pub github: GithubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Files,
            content_dir: "content".into(),
            default_cover: "/defaultproject.jpeg".into(),
            bind: "127.0.0.1:3000".into(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            notion: NotionConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl Config {
    pub fn load(site_dir: &Path) -> Result<Self> {
        match fs::read_to_string(site_dir.join("_config.toml")) {
            // Silently proceed if the file isn't found, but crash on other errors.
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)?,
            Ok(s) => Ok(toml::from_str(&s)?),
        }
    }
}

/// Settings for the content API backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    pub base_url: String,
    /// Sent as the `Notion-Version` header.
    pub version: String,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    pub timeout_secs: u64,
    /// Checkbox property that marks a page as published. Empty disables the
    /// filter.
    pub published_property: String,
    /// Rich text property holding a page's slug. Empty means pages are only
    /// addressed by id.
    pub slug_property: String,
    pub title_property: String,
    pub databases: Databases,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/".into(),
            version: "2022-06-28".into(),
            token_env: "NOTION_TOKEN".into(),
            timeout_secs: 10,
            published_property: "Published".into(),
            slug_property: "Slug".into(),
            title_property: "Name".into(),
            databases: Databases::default(),
        }
    }
}

/// Database ids, one per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Databases {
    pub articles: Option<String>,
    pub projects: Option<String>,
}

impl Databases {
    pub fn get(&self, collection: Collection) -> Option<&str> {
        let id = match collection {
            Collection::Articles => self.articles.as_deref(),
            Collection::Projects => self.projects.as_deref(),
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Settings for reading the content tree from a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub base_url: String,
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit to read. Empty means the default branch.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Name of the environment variable holding the API token. Without one,
    /// requests are sent unauthenticated.
    pub token_env: String,
    pub timeout_secs: u64,
    /// Repository directories holding each collection.
    pub articles_path: String,
    pub projects_path: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com/".into(),
            owner: String::new(),
            repo: String::new(),
            git_ref: String::new(),
            token_env: "GITHUB_TOKEN".into(),
            timeout_secs: 10,
            articles_path: "content/articles".into(),
            projects_path: "content/projects".into(),
        }
    }
}

impl GithubConfig {
    pub fn path(&self, collection: Collection) -> &str {
        let path = match collection {
            Collection::Articles => &self.articles_path,
            Collection::Projects => &self.projects_path,
        };
        path.trim_matches('/')
    }
}
