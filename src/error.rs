//! Error taxonomy for the synchronization pipeline.
//!
//! Each type corresponds to the granularity at which it is caught:
//!
//! | Error | Scope | Effect on the run |
//! |-------|-------|-------------------|
//! | [`CatalogReadError`] | run | run fails, nothing is processed |
//! | [`FetchError`], [`ParseError`] | source | source recorded as failed, run continues |
//! | [`StoreError`] | entry | entry recorded as failed, not counted |
//! | [`EmbeddingError`] | entry | article kept without a vector, still counted |
//!
//! Invalid and duplicate entries are not errors; they are outcomes of the
//! per-entry state machine (see [`crate::pipeline::EntryOutcome`]).

use thiserror::Error;

/// The source catalog could not be read. Fatal to the run.
#[derive(Debug, Clone, Error)]
#[error("source catalog unreadable: {message}")]
pub struct CatalogReadError {
    pub message: String,
}

impl CatalogReadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CatalogReadError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A feed could not be retrieved.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Server errors, rate limiting, timeouts and connection failures are
    /// transient; other 4xx statuses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
        }
    }
}

/// Feed content is not well-formed feed markup.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("document root <{root}> is not a syndication feed")]
    NotAFeed { root: String },

    #[error("document contains no elements")]
    Empty,

    #[error("document ended inside <{element}>")]
    Unclosed { element: String },
}

/// A source-level failure: the source moved to `Failed` and was skipped.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("worker aborted: {0}")]
    Aborted(String),
}

impl SourceError {
    /// Short machine-readable kind used in logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Fetch(_) => "fetch",
            SourceError::Parse(_) => "parse",
            SourceError::Aborted(_) => "aborted",
        }
    }
}

/// An article store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The URL is already stored. Treated as a duplicate skip by the pipeline.
    #[error("an article with url {url} already exists")]
    Duplicate { url: String },

    #[error("article {article_id} already has an embedding")]
    EmbeddingExists { article_id: i64 },

    #[error("no article with id {article_id}")]
    UnknownArticle { article_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Backend(String),
}

/// The embedding for a newly inserted article could not be computed or saved.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("embedding request failed: {0}")]
    Network(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("expected a {expected}-dimensional vector, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to store embedding: {0}")]
    Persist(#[from] StoreError),
}
