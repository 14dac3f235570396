use crate::core::Context;
use crate::error::Error;
use crate::model::{ContentItem, TocEntry};
use crate::pipeline::{Document, Lookup, Pipeline};
use crate::source::Collection;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::body::AsyncReadBody;
use serde::{Deserialize, Serialize};
use std::path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// How many item bodies to fetch at once when listing with exact read times.
const READ_TIME_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub ctx: Arc<Context>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/{collection}", get(list))
        .route("/api/{collection}/{slug}", get(item))
        .route("/images/{*path}", get(image))
        .with_state(state)
}

#[tokio::main]
pub async fn serve(ctx: Context, pipeline: Pipeline) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&ctx.config.bind).await?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        ctx: Arc::new(ctx),
    };
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// The two failures a client can see.
#[derive(Debug, PartialEq, Eq)]
enum ApiError {
    NotFound,
    Unavailable,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            ApiError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "temporarily unavailable"),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound { .. } | Error::MalformedRecord(_) => ApiError::NotFound,
            Error::SourceUnavailable(reason) => {
                warn!(%reason, "content source unavailable");
                ApiError::Unavailable
            }
        }
    }
}

fn collection(name: &str) -> Result<Collection, ApiError> {
    name.parse().map_err(|_| ApiError::NotFound)
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    read_times: Option<String>,
}

#[derive(Serialize)]
struct ListBody {
    results: Vec<ContentItem>,
}

/// A rendered item as clients see it.
#[derive(Serialize)]
pub struct ItemBody {
    item: ContentItem,
    html: String,
    toc: Vec<TocEntry>,
}

impl From<Document> for ItemBody {
    fn from(doc: Document) -> Self {
        Self {
            item: doc.item,
            html: doc.rendered.html,
            toc: doc.rendered.toc,
        }
    }
}

async fn list(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListBody>, ApiError> {
    debug!("GET /api/{name}");
    let collection = collection(&name)?;
    let results = match params.read_times.as_deref() {
        Some("exact") => {
            state
                .pipeline
                .list_with_read_times(collection, READ_TIME_CONCURRENCY)
                .await?
        }
        _ => state.pipeline.list(collection).await?,
    };
    Ok(Json(ListBody { results }))
}

async fn item(
    State(state): State<AppState>,
    Path((name, slug)): Path<(String, String)>,
) -> Result<Json<ItemBody>, ApiError> {
    debug!("GET /api/{name}/{slug}");
    let collection = collection(&name)?;
    match state.pipeline.get_one(collection, &slug).await? {
        Lookup::Found(doc) => Ok(Json(ItemBody::from(*doc))),
        Lookup::NotFound => Err(ApiError::NotFound),
    }
}

/// Serve an image from the content directory.
async fn image(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    debug!("GET /images/{path}");
    let src_path = state.ctx.resolve_image(&path).ok_or(ApiError::NotFound)?;
    send_file(&src_path).await
}

/// Respond with the contents of a file on the filesystem.
async fn send_file(path: &path::Path) -> Result<Response, ApiError> {
    let mime = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(mime_guess::mime::OCTET_STREAM.as_str());

    let file = fs::File::open(path).await.map_err(|e| {
        debug!(path = %path.display(), error = %e, "cannot open image");
        ApiError::NotFound
    })?;

    let headers = [
        (header::CONTENT_TYPE, mime),
        (header::CACHE_CONTROL, "public, max-age=31536000"),
    ];
    let body = AsyncReadBody::new(file);
    Ok((headers, body).into_response())
}
