use bienestar_core::StoreError;
use mongodb::error::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MongoStoreError>;

#[derive(Debug, Error)]
pub enum MongoStoreError {
    #[error("MongoDB driver error: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("Document conversion failed: {0}")]
    Conversion(String),
}

impl MongoStoreError {
    /// True when the driver failed to reach the server at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Driver(e) => matches!(
                *e.kind,
                ErrorKind::Io(_)
                    | ErrorKind::ServerSelection { .. }
                    | ErrorKind::ConnectionPoolCleared { .. }
                    | ErrorKind::DnsResolve { .. }
            ),
            Self::Conversion(_) => false,
        }
    }

    pub fn into_read_error(self, collection: &str) -> StoreError {
        match self {
            e if e.is_connectivity() => StoreError::connection(e.to_string()),
            Self::Conversion(message) => StoreError::invalid_document(message),
            other => StoreError::read(collection, other.to_string()),
        }
    }

    /// The driver does not report how much of a failed ordered batch landed,
    /// so `inserted` stays unknown.
    pub fn into_write_error(self, collection: &str) -> StoreError {
        match self {
            e if e.is_connectivity() => StoreError::connection(e.to_string()),
            Self::Conversion(message) => StoreError::invalid_document(message),
            other => StoreError::write(collection, None, other.to_string()),
        }
    }
}
