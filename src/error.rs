//! Error taxonomy for the retrieval and embedding pipeline.
//!
//! Every fallible library operation returns [`Result`], whose error type
//! [`RadiateError`] names the failure class the caller needs to act on:
//! bad input, bad configuration, backend classification (auth, rate limit,
//! quota, availability), and index/collection state.
//!
//! Backend errors are classified once, at the HTTP boundary, and are never
//! retried inside the crate. Use [`RadiateError::is_retryable`] to decide
//! whether a retry is worth attempting.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RadiateError>;

/// All errors surfaced by `radiate`.
#[derive(Debug, thiserror::Error)]
pub enum RadiateError {
    /// Text passed to the embedder was empty or whitespace-only.
    #[error("cannot embed empty text{}", .index.map(|i| format!(" (batch index {i})")).unwrap_or_default())]
    EmptyInput { index: Option<usize> },

    #[error("invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),

    #[error("unsupported file type: {extension}. Supported: .txt, .md, .pdf")]
    UnsupportedFormat { extension: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    /// Any other backend failure (unexpected status, malformed response).
    #[error("backend error: {0}")]
    Backend(String),

    #[error("unknown search mode: {mode}. Valid modes: {valid}")]
    InvalidMode { mode: String, valid: &'static str },

    #[error(
        "collection '{collection}' stores {existing}-dimensional vectors but the embedding model produces {expected}; delete the collection or choose another name"
    )]
    CollectionDimensionMismatch {
        collection: String,
        existing: usize,
        expected: usize,
    },

    #[error("{operation} is destructive; pass confirm = true to proceed")]
    ConfirmationRequired { operation: String },

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no files matching {patterns:?} in {}", .dir.display())]
    NoFilesMatched { dir: PathBuf, patterns: Vec<String> },

    #[error("BM25 model was fitted on {fitted} documents but scored against {given}")]
    Bm25CorpusMismatch { fitted: usize, given: usize },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RadiateError {
    /// Whether the caller may reasonably retry the failed request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RadiateError::RateLimit(_)
                | RadiateError::BackendUnavailable(_)
                | RadiateError::Timeout(_)
        )
    }

    /// Classify a non-success HTTP response from an external service.
    ///
    /// Shared by the embedding, completion and vector index clients so that
    /// every backend reports the same taxonomy.
    pub(crate) fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{} returned {}: {}", service, status, body);
        match status.as_u16() {
            401 | 403 => RadiateError::Authentication(detail),
            402 => RadiateError::QuotaExceeded(detail),
            429 if body.contains("insufficient_quota") || body.contains("quota") => {
                RadiateError::QuotaExceeded(detail)
            }
            429 => RadiateError::RateLimit(detail),
            s if s >= 500 => RadiateError::BackendUnavailable(detail),
            _ => RadiateError::Backend(detail),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub(crate) fn from_transport(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RadiateError::BackendUnavailable(format!("{} request timed out: {}", service, err))
        } else if err.is_connect() || err.is_request() {
            RadiateError::BackendUnavailable(format!("{} connection error: {}", service, err))
        } else if err.is_decode() {
            RadiateError::Backend(format!("{} returned an invalid body: {}", service, err))
        } else {
            RadiateError::Backend(format!("{}: {}", service, err))
        }
    }
}
