use super::{Collection, ContentSource, FileRecord, RawRecord};
use crate::core::ignore_filename;
use crate::error::{Error, Result};
use crate::markdown::frontmatter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Reads content from a directory tree: one subdirectory per collection, and
/// in it one `<slug>.md` file or `<slug>/` folder per item. A folder holds
/// either an `index.md` or a metadata-only `project.json`.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.name())
    }
}

#[async_trait]
impl ContentSource for FileSource {
    async fn list_records(&self, collection: Collection) -> Result<Vec<RawRecord>> {
        let dir = self.collection_dir(collection);
        tokio::task::spawn_blocking(move || load_collection(&dir, collection))
            .await
            .map_err(|e| Error::unavailable(format!("file loader task failed: {e}")))?
    }

    async fn get_record(&self, collection: Collection, slug: &str) -> Result<RawRecord> {
        let dir = self.collection_dir(collection);
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || load_one(&dir, collection, &slug))
            .await
            .map_err(|e| Error::unavailable(format!("file loader task failed: {e}")))?
    }
}

/// Load every item in a collection directory. A missing directory is just an
/// empty collection.
fn load_collection(dir: &Path, collection: Collection) -> Result<Vec<RawRecord>> {
    match fs::metadata(dir) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "collection directory missing; listing nothing");
            return Ok(vec![]);
        }
        Err(e) => return Err(unavailable(dir, e)),
        Ok(meta) if !meta.is_dir() => {
            return Err(Error::unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(_) => (),
    }

    let mut records = vec![];
    let walk = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !ignore_filename(e.file_name()));
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "directory walk error");
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
            continue;
        };

        let loaded = if entry.file_type().is_dir() {
            if dir.join(format!("{name}.md")).is_file() {
                warn!(path = %entry.path().display(), "folder shadowed by {name}.md; skipping");
                continue;
            }
            load_folder(entry.path(), name, collection)
        } else if let Some(slug) = note_slug(name) {
            read_note(entry.path(), slug, collection.name().to_string()).map(Some)
        } else {
            Ok(None)
        };
        match loaded {
            Ok(Some(record)) => records.push(record),
            Ok(None) => (),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping unreadable item"),
        }
    }

    sort_records(collection, &mut records);
    Ok(records.into_iter().map(RawRecord::File).collect())
}

/// Load the single item called `slug`.
fn load_one(dir: &Path, collection: Collection, slug: &str) -> Result<RawRecord> {
    let not_found = || Error::NotFound {
        collection,
        slug: slug.to_string(),
    };
    if !is_safe_slug(slug) {
        return Err(not_found());
    }

    let note = dir.join(format!("{slug}.md"));
    let loaded = match read_note(&note, slug, collection.name().to_string()) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
            load_folder(&dir.join(slug), slug, collection)
        }
        other => other.map(Some),
    };
    match loaded {
        Ok(Some(record)) => Ok(RawRecord::File(record)),
        Ok(None) => Err(not_found()),
        Err(ref e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Err(not_found())
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            Err(Error::MalformedRecord(format!("{collection}/{slug}: {e}")))
        }
        Err(e) => Err(unavailable(dir, e)),
    }
}

/// Load a folder item from its `index.md` or `project.json`. Returns `None`
/// for folders that hold neither.
fn load_folder(path: &Path, slug: &str, collection: Collection) -> io::Result<Option<FileRecord>> {
    let asset_dir = format!("{}/{slug}", collection.name());
    match read_note(&path.join("index.md"), slug, asset_dir.clone()) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => (),
        other => return other.map(Some),
    }
    match read_project_json(&path.join("project.json"), slug, asset_dir) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        other => other.map(Some),
    }
}

fn read_note(path: &Path, slug: &str, asset_dir: String) -> io::Result<FileRecord> {
    let source = fs::read_to_string(path)?;
    Ok(note_record(&source, slug, asset_dir, modified_time(path)))
}

fn read_project_json(path: &Path, slug: &str, asset_dir: String) -> io::Result<FileRecord> {
    let source = fs::read_to_string(path)?;
    project_record(&source, slug, asset_dir, modified_time(path))
}

/// Build a record from the text of a Markdown note.
pub(super) fn note_record(
    source: &str,
    slug: &str,
    asset_dir: String,
    modified: Option<DateTime<Utc>>,
) -> FileRecord {
    let parsed = frontmatter::parse(source);
    FileRecord {
        slug: slug.to_string(),
        frontmatter: parsed.metadata,
        body: parsed.body.to_string(),
        modified,
        asset_dir: Some(asset_dir),
    }
}

/// Build a metadata-only record from the text of a `project.json`.
pub(super) fn project_record(
    source: &str,
    slug: &str,
    asset_dir: String,
    modified: Option<DateTime<Utc>>,
) -> io::Result<FileRecord> {
    let frontmatter: Map<String, Value> = match serde_json::from_str::<Value>(source)? {
        Value::Object(map) => map,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "project.json must hold an object",
            ));
        }
    };
    Ok(FileRecord {
        slug: slug.to_string(),
        frontmatter,
        body: String::new(),
        modified,
        asset_dir: Some(asset_dir),
    })
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.into())
}

/// If this file name is a Markdown note, return its slug.
pub(super) fn note_slug(name: &str) -> Option<&str> {
    name.strip_suffix(".md").filter(|stem| !stem.is_empty())
}

/// A slug must name exactly one visible entry inside the collection directory.
pub(super) fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug != "."
        && slug != ".."
        && !slug.contains(['/', '\\'])
        && !ignore_filename(OsStr::new(slug))
}

/// Put records in the collection's canonical order: articles newest first
/// (undated last), projects by title. Ties go by slug.
pub(super) fn sort_records(collection: Collection, records: &mut [FileRecord]) {
    match collection {
        Collection::Articles => records.sort_by(|a, b| {
            match (a.date(), b.date()) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| a.slug.cmp(&b.slug))
        }),
        Collection::Projects => records.sort_by(|a, b| {
            sort_title(a)
                .cmp(&sort_title(b))
                .then_with(|| a.slug.cmp(&b.slug))
        }),
    }
}

fn sort_title(record: &FileRecord) -> String {
    record.str_field("title").unwrap_or(&record.slug).to_lowercase()
}

fn unavailable(path: &Path, e: io::Error) -> Error {
    Error::unavailable(format!("cannot read {}: {e}", path.display()))
}
