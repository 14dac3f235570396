use crate::error::{Error, Result};
use crate::markdown;
use crate::model::{ContentItem, RenderedDocument};
use crate::normalize::{Defaults, Detail, normalize};
use crate::source::{Collection, ContentSource};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fully loaded item and its rendered body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub item: ContentItem,
    pub rendered: RenderedDocument,
}

/// The result of looking up a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Box<Document>),
    NotFound,
}

/// Ties a content source to normalization and rendering. This is the one
/// place that decides what a failure looks like to the caller.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn ContentSource>,
    defaults: Defaults,
    max_document_bytes: usize,
}

impl Pipeline {
    pub fn new(source: Arc<dyn ContentSource>, defaults: Defaults, max_document_bytes: usize) -> Self {
        Self {
            source,
            defaults,
            max_document_bytes,
        }
    }

    /// Every item in a collection, in the source's order, with placeholder
    /// read times. Malformed records are left out.
    pub async fn list(&self, collection: Collection) -> Result<Vec<ContentItem>> {
        let records = self.source.list_records(collection).await?;
        let mut items = Vec::with_capacity(records.len());
        for raw in &records {
            match normalize(raw, Detail::Listing, &self.defaults) {
                Ok(item) => items.push(item),
                Err(e) => warn!(%collection, error = %e, "skipping record"),
            }
        }
        debug!(%collection, count = items.len(), "listed items");
        Ok(apply_featured_default(items))
    }

    /// Like `list`, but with read times computed from each item's body. Up to
    /// `concurrency` items are fetched at once. Items whose body can't be
    /// fetched keep their placeholder.
    pub async fn list_with_read_times(
        &self,
        collection: Collection,
        concurrency: usize,
    ) -> Result<Vec<ContentItem>> {
        let items = self.list(collection).await?;
        let items = stream::iter(items)
            .map(|item| async move {
                match self.exact_read_time(collection, &item.slug).await {
                    Some(minutes) => item.with_read_time(minutes),
                    None => item,
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;
        Ok(items)
    }

    async fn exact_read_time(&self, collection: Collection, slug: &str) -> Option<u32> {
        let raw = match self.source.get_record(collection, slug).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(%collection, slug, error = %e, "keeping placeholder read time");
                return None;
            }
        };
        normalize(&raw, Detail::Full, &self.defaults)
            .ok()
            .map(|item| item.read_time_minutes)
    }

    /// Whether the collection listing features this item because nothing in
    /// it is flagged. A listing that can't be loaded features nothing.
    async fn featured_by_default(&self, collection: Collection, slug: &str) -> bool {
        match self.list(collection).await {
            Ok(items) => items.iter().any(|i| i.slug == slug && i.featured),
            Err(e) => {
                debug!(%collection, slug, error = %e, "cannot check the featured default");
                false
            }
        }
    }

    /// Load, render, and normalize one item. Its `featured` flag matches what
    /// the collection listing shows.
    pub async fn get_one(&self, collection: Collection, slug: &str) -> Result<Lookup> {
        let raw = match self.source.get_record(collection, slug).await {
            Ok(raw) => raw,
            Err(Error::NotFound { .. }) => return Ok(Lookup::NotFound),
            Err(Error::MalformedRecord(reason)) => {
                warn!(%collection, slug, %reason, "malformed record");
                return Ok(Lookup::NotFound);
            }
            Err(e) => return Err(e),
        };

        let mut item = match normalize(&raw, Detail::Full, &self.defaults) {
            Ok(item) => item,
            Err(e) => {
                warn!(%collection, slug, error = %e, "malformed record");
                return Ok(Lookup::NotFound);
            }
        };
        if !item.featured && self.featured_by_default(collection, &item.slug).await {
            item = item.with_featured(true);
        }

        let html = markdown::render(raw.body().unwrap_or_default(), self.max_document_bytes);
        let (html, toc) = markdown::build_toc(&html);
        info!(%collection, slug, headings = toc.len(), "rendered item");
        Ok(Lookup::Found(Box::new(Document {
            item,
            rendered: RenderedDocument { html, toc },
        })))
    }
}

/// If nothing in a collection is marked featured, feature its first item.
pub fn apply_featured_default(items: Vec<ContentItem>) -> Vec<ContentItem> {
    if items.iter().any(|item| item.featured) {
        return items;
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| if i == 0 { item.with_featured(true) } else { item.clone() })
        .collect()
}
