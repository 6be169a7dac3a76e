use bienestar_core::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Writer actor is not running")]
    WriterClosed,

    #[error("Blocking task failed: {0}")]
    Join(String),
}

impl StorageError {
    /// Maps into the store taxonomy for a read on `collection`.
    pub fn into_read_error(self, collection: &str) -> StoreError {
        match self {
            Self::Pool(e) => StoreError::connection(e.to_string()),
            Self::WriterClosed => StoreError::connection(Self::WriterClosed.to_string()),
            Self::Json(e) => StoreError::invalid_document(e.to_string()),
            other => StoreError::read(collection, other.to_string()),
        }
    }

    /// Maps into the store taxonomy for a write on `collection`. Writes run in
    /// one transaction, so a failed batch committed nothing.
    pub fn into_write_error(self, collection: &str) -> StoreError {
        match self {
            Self::Pool(e) => StoreError::connection(e.to_string()),
            Self::WriterClosed => StoreError::connection(Self::WriterClosed.to_string()),
            Self::Json(e) => StoreError::invalid_document(e.to_string()),
            Self::InvalidDocument(message) => StoreError::invalid_document(message),
            other => StoreError::write(collection, Some(0), other.to_string()),
        }
    }
}
