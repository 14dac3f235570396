//! Reads the content tree the file backend reads, but from a GitHub
//! repository through the repository contents API. Records come out exactly
//! as the file backend builds them, except that they carry no modification
//! time.

use super::files::{is_safe_slug, note_record, note_slug, project_record, sort_records};
use super::{Collection, ContentSource, FileRecord, RawRecord, http};
use crate::core::{GithubConfig, ignore_filename};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use tracing::{debug, info, warn};

/// How many items are fetched at once while listing.
const FETCH_CONCURRENCY: usize = 8;

const API_VERSION: &str = "2022-11-28";

/// A contents API answer: a directory listing or a single file.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Contents {
    Dir(Vec<Entry>),
    File(FileContent),
}

#[derive(Deserialize, Debug)]
struct Entry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize, Debug)]
struct FileContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Clone)]
pub struct GithubSource {
    http: Client,
    base_url: Url,
    token: Option<String>,
    cfg: GithubConfig,
}

impl fmt::Debug for GithubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSource")
            .field("base_url", &self.base_url)
            .field("owner", &self.cfg.owner)
            .field("repo", &self.cfg.repo)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GithubSource {
    pub fn from_config(cfg: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env).ok();
        if token.is_none() {
            debug!(var = %cfg.token_env, "no GitHub token set; sending unauthenticated requests");
        }
        Self::new(cfg, token)
    }

    pub fn new(cfg: &GithubConfig, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| Error::unavailable(format!("invalid API base URL {}: {e}", cfg.base_url)))?;
        Ok(Self {
            http: http::client(cfg.timeout_secs)?,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            cfg: cfg.clone(),
        })
    }

    /// A repository path inside a collection's directory.
    fn repo_path(&self, collection: Collection, rel: &str) -> String {
        match self.cfg.path(collection) {
            "" => rel.to_string(),
            dir => format!("{dir}/{rel}"),
        }
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        if self.cfg.owner.is_empty() || self.cfg.repo.is_empty() {
            return Err(Error::unavailable("no GitHub repository configured"));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::unavailable("API base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(["repos", self.cfg.owner.as_str(), self.cfg.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        if !self.cfg.git_ref.is_empty() {
            url.query_pairs_mut().append_pair("ref", &self.cfg.git_ref);
        }
        Ok(url)
    }

    /// Fetch a repository path. A missing path is `None`.
    async fn contents(&self, path: &str) -> Result<Option<Contents>> {
        let mut req = self
            .http
            .get(self.contents_url(path)?)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = http::send(req).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let contents = http::expect_success(res)
            .await?
            .json::<Contents>()
            .await
            .map_err(|e| Error::unavailable(format!("invalid contents response for {path}: {e}")))?;
        Ok(Some(contents))
    }

    /// Fetch the text of a file. Paths that are missing or aren't regular
    /// files are `None`.
    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        match self.contents(path).await? {
            Some(Contents::File(file)) if file.kind == "file" => decode(&file, path).map(Some),
            _ => Ok(None),
        }
    }

    async fn load_note(&self, collection: Collection, slug: &str) -> Result<Option<FileRecord>> {
        let path = self.repo_path(collection, &format!("{slug}.md"));
        let source = self.read_file(&path).await?;
        Ok(source.map(|s| note_record(&s, slug, collection.name().to_string(), None)))
    }

    async fn load_folder(&self, collection: Collection, slug: &str) -> Result<Option<FileRecord>> {
        let dir = self.repo_path(collection, slug);
        let asset_dir = format!("{}/{slug}", collection.name());
        if let Some(source) = self.read_file(&format!("{dir}/index.md")).await? {
            return Ok(Some(note_record(&source, slug, asset_dir, None)));
        }
        let Some(source) = self.read_file(&format!("{dir}/project.json")).await? else {
            return Ok(None);
        };
        project_record(&source, slug, asset_dir, None)
            .map(Some)
            .map_err(|e| Error::MalformedRecord(format!("{collection}/{slug}: {e}")))
    }
}

/// Decode a file's base64 content, which the API wraps across lines.
fn decode(file: &FileContent, path: &str) -> Result<String> {
    if file.encoding != "base64" {
        return Err(Error::MalformedRecord(format!(
            "{path}: unsupported content encoding `{}`",
            file.encoding
        )));
    }
    let packed: String = file.content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| Error::MalformedRecord(format!("{path}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::MalformedRecord(format!("{path}: {e}")))
}

#[async_trait]
impl ContentSource for GithubSource {
    async fn list_records(&self, collection: Collection) -> Result<Vec<RawRecord>> {
        let dir = self.cfg.path(collection);
        let entries = match self.contents(dir).await? {
            Some(Contents::Dir(entries)) => entries,
            Some(Contents::File(_)) => {
                return Err(Error::unavailable(format!("{dir} is not a directory")));
            }
            None => {
                debug!(dir, "collection directory missing; listing nothing");
                return Ok(vec![]);
            }
        };

        let entries: Vec<Entry> = entries
            .into_iter()
            .filter(|e| !ignore_filename(OsStr::new(&e.name)))
            .collect();
        let notes: HashSet<&str> = entries
            .iter()
            .filter(|e| e.kind == "file")
            .filter_map(|e| note_slug(&e.name))
            .collect();

        // (slug, is_folder) for every entry that can hold an item.
        let mut items: Vec<(&str, bool)> = vec![];
        for entry in &entries {
            match entry.kind.as_str() {
                "file" => items.extend(note_slug(&entry.name).map(|slug| (slug, false))),
                "dir" if notes.contains(entry.name.as_str()) => {
                    warn!(%collection, name = %entry.name, "folder shadowed by {}.md; skipping", entry.name);
                }
                "dir" => items.push((&entry.name, true)),
                _ => (),
            }
        }

        let fetches: Vec<_> = items
            .iter()
            .map(|&(slug, folder)| async move {
                if folder {
                    self.load_folder(collection, slug).await
                } else {
                    self.load_note(collection, slug).await
                }
            })
            .collect();
        let loaded: Vec<Result<Option<FileRecord>>> = stream::iter(fetches)
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut records = vec![];
        for (&(slug, _), result) in items.iter().zip(loaded) {
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => (),
                Err(Error::MalformedRecord(reason)) => {
                    warn!(%collection, slug, %reason, "skipping unreadable item");
                }
                Err(e) => return Err(e),
            }
        }

        sort_records(collection, &mut records);
        info!(%collection, count = records.len(), "fetched records from GitHub");
        Ok(records.into_iter().map(RawRecord::File).collect())
    }

    async fn get_record(&self, collection: Collection, slug: &str) -> Result<RawRecord> {
        let not_found = || Error::NotFound {
            collection,
            slug: slug.to_string(),
        };
        if !is_safe_slug(slug) {
            return Err(not_found());
        }
        let record = match self.load_note(collection, slug).await? {
            Some(record) => Some(record),
            None => self.load_folder(collection, slug).await?,
        };
        record.map(RawRecord::File).ok_or_else(not_found)
    }
}
