//! Builds document store handles from connection URIs.

use std::sync::Arc;

use log::info;

use bienestar_core::documents::{DocumentStore, MemoryStore};
use bienestar_core::sync::{retry_with_backoff, RetryPolicy};
use bienestar_core::{StoreError, StoreResult};
use bienestar_storage_mongo::MongoDocumentStore;
use bienestar_storage_sqlite::SqliteDocumentStore;

const SQLITE_SCHEME: &str = "sqlite://";
const MEMORY_SCHEME: &str = "memory://";

/// Backend selected by the scheme of a store URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    /// `mongodb://` or `mongodb+srv://`, kept whole for the driver.
    Mongo(String),
    /// `sqlite://<path>`
    Sqlite(String),
    /// `memory://`
    Memory,
}

impl StoreUri {
    pub fn parse(uri: &str) -> StoreResult<Self> {
        let uri = uri.trim();
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            return Ok(Self::Mongo(uri.to_string()));
        }
        if let Some(path) = uri.strip_prefix(SQLITE_SCHEME) {
            if path.is_empty() {
                return Err(StoreError::config("sqlite:// URI has no database path"));
            }
            return Ok(Self::Sqlite(path.to_string()));
        }
        if uri.starts_with(MEMORY_SCHEME) {
            return Ok(Self::Memory);
        }
        Err(StoreError::config(format!(
            "Unsupported store URI scheme in '{}'",
            redact(uri)
        )))
    }
}

/// Hides credentials before a URI reaches a log line or error message.
pub fn redact(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &uri[..scheme_end], &uri[at + 1..])
        }
        _ => uri.to_string(),
    }
}

async fn open_once(target: &StoreUri, database: &str) -> StoreResult<Arc<dyn DocumentStore>> {
    match target {
        StoreUri::Mongo(uri) => {
            let store = MongoDocumentStore::connect(uri, database)
                .await
                .map_err(|e| {
                    if e.is_connectivity() {
                        StoreError::connection(e.to_string())
                    } else {
                        StoreError::config(e.to_string())
                    }
                })?;
            Ok(Arc::new(store))
        }
        StoreUri::Sqlite(path) => {
            let path = path.clone();
            let store = tokio::task::spawn_blocking(move || SqliteDocumentStore::open(&path))
                .await
                .map_err(|e| StoreError::connection(e.to_string()))?
                .map_err(|e| StoreError::connection(e.to_string()))?;
            Ok(Arc::new(store))
        }
        StoreUri::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Opens the store behind `uri`, retrying connection failures under `retry`.
/// A malformed URI fails immediately.
pub async fn open_store(
    uri: &str,
    database: &str,
    retry: &RetryPolicy,
) -> StoreResult<Arc<dyn DocumentStore>> {
    let target = StoreUri::parse(uri)?;
    let label = format!("Opening store {}", redact(uri));
    let (result, attempts) = retry_with_backoff(retry, &label, false, || {
        open_once(&target, database)
    })
    .await;
    let store = result?;
    info!(
        "[Stores] Opened {} store {} after {} attempt(s)",
        store.backend(),
        redact(uri),
        attempts
    );
    Ok(store)
}
