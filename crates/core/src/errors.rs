//! Error types shared by the survey writer, the mirror and store backends.

use thiserror::Error;

/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for document store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Retry policy class for store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRetryClass {
    Retryable,
    Permanent,
}

/// Errors raised by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be reached (at startup or mid-operation)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Listing a collection failed
    #[error("Read failed on '{collection}': {message}")]
    Read { collection: String, message: String },

    /// Insert rejected by the store (validation, duplicate key, size limit...).
    /// `inserted` is the number of documents of the batch already committed,
    /// when the backend is able to tell.
    #[error("Write failed on '{collection}': {message}")]
    Write {
        collection: String,
        inserted: Option<usize>,
        message: String,
    },

    /// Document cannot be represented in the target store
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Operation exceeded its deadline
    #[error("Timed out after {seconds}s on '{collection}'")]
    Timeout { collection: String, seconds: u64 },

    /// Store misconfiguration (bad URI, unknown scheme...)
    #[error("Store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn read(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn write(
        collection: impl Into<String>,
        inserted: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::Write {
            collection: collection.into(),
            inserted,
            message: message.into(),
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify error for retry policy.
    ///
    /// Write failures are permanent here: retrying a partially applied bulk
    /// insert would duplicate its committed prefix. Callers that write
    /// idempotently (upserts) may retry them anyway.
    pub fn retry_class(&self) -> StoreRetryClass {
        match self {
            Self::Connection(_) | Self::Read { .. } | Self::Timeout { .. } => {
                StoreRetryClass::Retryable
            }
            Self::Write { .. } | Self::InvalidDocument(_) | Self::Config(_) => {
                StoreRetryClass::Permanent
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == StoreRetryClass::Retryable
    }
}

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Submission payload is not a flat JSON object
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
