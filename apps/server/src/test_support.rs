//! Application states backed by in-memory stores for handler tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use bienestar_context::{MirrorConfig, ServiceContext};
use bienestar_core::documents::{
    Document, DocumentId, DocumentStore, MemoryStore, UpsertSummary,
};
use bienestar_core::sync::{MirrorOptions, RetryPolicy};
use bienestar_core::{StoreError, StoreResult};

use crate::config::ServerConfig;
use crate::main_lib::AppState;

fn options() -> MirrorOptions {
    MirrorOptions {
        retry: RetryPolicy::no_retry(),
        ..MirrorOptions::default()
    }
}

fn state_for(context: ServiceContext) -> Arc<AppState> {
    Arc::new(AppState {
        context: Arc::new(context),
        config: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            mirror: MirrorConfig::default(),
        },
    })
}

/// Intake only: a source store and no destination.
pub fn memory_state() -> (Arc<AppState>, Arc<dyn DocumentStore>) {
    let source: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let context = ServiceContext::new("test", Arc::clone(&source), None, options());
    (state_for(context), source)
}

pub fn mirror_state() -> (Arc<AppState>, Arc<dyn DocumentStore>, Arc<dyn DocumentStore>) {
    let source: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let destination: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let context = ServiceContext::new(
        "test",
        Arc::clone(&source),
        Some(Arc::clone(&destination)),
        options(),
    );
    (state_for(context), source, destination)
}

/// Mirror state whose source takes `delay` for every collection read.
pub fn slow_mirror_state(
    delay: Duration,
) -> (Arc<AppState>, Arc<dyn DocumentStore>, Arc<dyn DocumentStore>) {
    let source: Arc<dyn DocumentStore> = Arc::new(SlowReadStore {
        inner: MemoryStore::new(),
        delay,
    });
    let destination: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let context = ServiceContext::new(
        "test",
        Arc::clone(&source),
        Some(Arc::clone(&destination)),
        options(),
    );
    (state_for(context), source, destination)
}

/// Source store whose inserts into `rejected` always fail.
pub fn failing_state(rejected: &'static str) -> Arc<AppState> {
    let source: Arc<dyn DocumentStore> = Arc::new(RejectingStore {
        inner: MemoryStore::new(),
        rejected,
    });
    state_for(ServiceContext::new("test", source, None, options()))
}

struct RejectingStore {
    inner: MemoryStore,
    rejected: &'static str,
}

#[async_trait]
impl DocumentStore for RejectingStore {
    fn backend(&self) -> &'static str {
        "rejecting"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.find_all(collection).await
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        self.inner.count(collection).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        if collection == self.rejected {
            return Err(StoreError::write(collection, Some(0), "document rejected"));
        }
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        self.inner.insert_many(collection, documents).await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary> {
        self.inner.upsert_many(collection, key_field, documents).await
    }
}

struct SlowReadStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowReadStore {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_all(collection).await
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        self.inner.count(collection).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        self.inner.insert_many(collection, documents).await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary> {
        self.inner.upsert_many(collection, key_field, documents).await
    }
}
