use crate::source::Collection;
use thiserror::Error;

/// The ways loading content can fail. Rendering problems never show up here:
/// the Markdown renderer degrades to an escaped fallback instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The slug does not resolve to a record in a reachable backend.
    #[error("no {collection} item with slug `{slug}`")]
    NotFound { collection: Collection, slug: String },

    /// The backend is unreachable, misconfigured, or timed out. Safe to retry
    /// later.
    #[error("content source unavailable: {0}")]
    SourceUnavailable(String),

    /// A record lacks its unique identifier.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl Error {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
