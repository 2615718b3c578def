// Error types for the catalog cache.
// Separates transport failures from store-level outcomes (missing arguments, cancellation).

use thiserror::Error;

/// Failure reported by a remote fetch transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bad request")]
    BadRequest,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Resource not found")]
    NotFound,

    #[error("Server error (HTTP {0})")]
    ServerError(u16),

    #[error("Service unavailable")]
    Unavailable,

    #[error("HTTP {0}")]
    Http(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request aborted")]
    Aborted,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => TransportError::BadRequest,
            401 => TransportError::Unauthorized,
            403 => TransportError::Forbidden,
            404 => TransportError::NotFound,
            503 => TransportError::Unavailable,
            500..=599 => TransportError::ServerError(status),
            _ => TransportError::Http(status),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::from_status(status.as_u16())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Coarse classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required configuration field is absent; the caller must reconfigure.
    ArgumentMissing,
    /// The request was superseded by a newer request or a reset.
    Cancel,
    /// The fetch failed and no usable fallback exists.
    Error,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("One or more required arguments are missing: {}", .0.join(", "))]
    ArgumentMissing(Vec<&'static str>),

    #[error("The request was canceled by a newer request")]
    Cancelled,

    #[error("Page {first_page} is not available (store holds {page_count} pages)")]
    OutOfRange { first_page: usize, page_count: usize },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] TransportError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ArgumentMissing(_) => ErrorKind::ArgumentMissing,
            StoreError::Cancelled => ErrorKind::Cancel,
            _ => ErrorKind::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
