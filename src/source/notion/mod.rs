use super::{ApiRecord, Collection, ContentSource, RawRecord, TypedProperty, http};
use crate::core::NotionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Value, json};
use std::fmt;
use tracing::{debug, info, warn};

pub mod blocks;
pub mod model;

use model::{ListResp, PageObject, looks_like_page_id, same_id};

const PAGE_SIZE: u32 = 100;

/// Reads records from a Notion-style content API, one database per
/// collection.
#[derive(Clone)]
pub struct NotionSource {
    http: Client,
    base_url: Url,
    token: Option<String>,
    cfg: NotionConfig,
}

impl fmt::Debug for NotionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionSource")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl NotionSource {
    /// Build a source from config, reading the token from the environment
    /// variable the config names.
    pub fn from_config(cfg: &NotionConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env).ok();
        if token.is_none() {
            warn!(var = %cfg.token_env, "no content API token set; requests will fail");
        }
        Self::new(cfg, token)
    }

    pub fn new(cfg: &NotionConfig, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| Error::unavailable(format!("invalid API base URL {}: {e}", cfg.base_url)))?;
        Ok(Self {
            http: http::client(cfg.timeout_secs)?,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            cfg: cfg.clone(),
        })
    }

    fn database(&self, collection: Collection) -> Result<&str> {
        self.cfg.databases.get(collection).ok_or_else(|| {
            Error::unavailable(format!("no database configured for {collection}"))
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::unavailable(format!("invalid API endpoint {path}: {e}")))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or_else(|| {
            Error::unavailable(format!("missing API credentials (set ${})", self.cfg.token_env))
        })?;
        Ok(req
            .header("Authorization", format!("Bearer {token}"))
            .header("Notion-Version", &self.cfg.version))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        http::send(self.authorized(req)?).await
    }

    async fn read_list(&self, res: Response) -> Result<ListResp> {
        http::expect_success(res)
            .await?
            .json::<ListResp>()
            .await
            .map_err(|e| Error::unavailable(format!("invalid content API response: {e}")))
    }

    fn published_filter(&self) -> Option<Value> {
        let prop = &self.cfg.published_property;
        (!prop.is_empty()).then(|| json!({"property": prop, "checkbox": {"equals": true}}))
    }

    /// The filter for a database query, optionally narrowed to one slug.
    pub fn query_filter(&self, slug: Option<&str>) -> Option<Value> {
        let slug_filter = slug
            .filter(|_| !self.cfg.slug_property.is_empty())
            .map(|s| json!({"property": self.cfg.slug_property, "rich_text": {"equals": s}}));
        match (self.published_filter(), slug_filter) {
            (Some(p), Some(s)) => Some(json!({"and": [p, s]})),
            (p, s) => p.or(s),
        }
    }

    pub fn sorts(&self, collection: Collection) -> Value {
        match collection {
            Collection::Articles => {
                json!([{"timestamp": "created_time", "direction": "descending"}])
            }
            Collection::Projects => {
                json!([{"property": self.cfg.title_property, "direction": "ascending"}])
            }
        }
    }

    /// Run a database query, following pagination to the end.
    async fn query(&self, collection: Collection, slug: Option<&str>) -> Result<Vec<ApiRecord>> {
        let database = self.database(collection)?;
        let url = self.endpoint(&format!("v1/databases/{database}/query"))?;

        let mut records = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "sorts": self.sorts(collection),
                "page_size": PAGE_SIZE,
            });
            if let Some(filter) = self.query_filter(slug) {
                body["filter"] = filter;
            }
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            debug!(%collection, cursor = ?cursor, "querying content database");
            let res = self.send(self.http.post(url.clone()).json(&body)).await?;
            let page = self.read_list(res).await?;
            for result in page.results {
                match decode_page(result) {
                    Ok(object) => records.push(object.into_record()),
                    Err(e) => warn!(%collection, error = %e, "skipping page"),
                }
            }

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        info!(%collection, count = records.len(), "fetched records from content API");
        Ok(records)
    }

    /// Fetch a page directly by id. Pages outside the collection's database,
    /// archived pages, and unpublished pages count as missing.
    async fn retrieve_page(&self, collection: Collection, id: &str) -> Result<Option<ApiRecord>> {
        let database = self.database(collection)?;
        let url = self.endpoint(&format!("v1/pages/{id}"))?;
        let res = self.send(self.http.get(url)).await?;
        if matches!(res.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Ok(None);
        }
        let value = http::expect_success(res)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| Error::unavailable(format!("invalid content API response: {e}")))?;
        let page = decode_page(value)?;

        let in_database = page
            .parent
            .database_id
            .as_deref()
            .is_some_and(|db| same_id(db, database));
        if !in_database || !page.is_live() {
            return Ok(None);
        }
        let record = page.into_record();
        if !self.is_published(&record) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn is_published(&self, record: &ApiRecord) -> bool {
        let prop = &self.cfg.published_property;
        prop.is_empty()
            || matches!(
                record.properties.get(prop),
                Some(TypedProperty::Checkbox { checkbox: true })
            )
    }

    /// Fetch a page's top-level blocks and convert them to Markdown.
    async fn page_markdown(&self, id: &str) -> Result<String> {
        let mut url = self.endpoint(&format!("v1/blocks/{id}/children"))?;
        let mut blocks = vec![];
        let mut cursor: Option<String> = None;
        loop {
            {
                let mut query = url.query_pairs_mut();
                query.clear().append_pair("page_size", &PAGE_SIZE.to_string());
                if let Some(c) = &cursor {
                    query.append_pair("start_cursor", c);
                }
            }
            let res = self.send(self.http.get(url.clone())).await?;
            let page = self.read_list(res).await?;
            blocks.extend(page.results);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(blocks::to_markdown(&blocks))
    }
}

fn decode_page(value: Value) -> Result<PageObject> {
    serde_json::from_value(value)
        .map_err(|e| Error::MalformedRecord(format!("unexpected page object: {e}")))
}

#[async_trait]
impl ContentSource for NotionSource {
    async fn list_records(&self, collection: Collection) -> Result<Vec<RawRecord>> {
        let records = self.query(collection, None).await?;
        Ok(records.into_iter().map(RawRecord::Api).collect())
    }

    async fn get_record(&self, collection: Collection, slug: &str) -> Result<RawRecord> {
        let mut found = if self.cfg.slug_property.is_empty() {
            None
        } else {
            self.query(collection, Some(slug)).await?.into_iter().next()
        };
        if found.is_none() && looks_like_page_id(slug) {
            found = self.retrieve_page(collection, slug).await?;
        }
        let Some(mut record) = found else {
            return Err(Error::NotFound {
                collection,
                slug: slug.to_string(),
            });
        };

        if !record.id.is_empty() {
            record.body = Some(self.page_markdown(&record.id).await?);
        }
        Ok(RawRecord::Api(record))
    }
}
