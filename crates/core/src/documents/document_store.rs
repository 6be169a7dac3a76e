use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Document, DocumentId};
use crate::errors::StoreResult;

/// Outcome of an upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Contract for a document database holding named collections.
///
/// Inserting a document whose `id` is `None` makes the store assign a fresh
/// identifier. A document carrying `Some(id)` is inserted under that id, and
/// the store rejects it if the id is already taken.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend label used in logs ("mongodb", "sqlite", "memory").
    fn backend(&self) -> &'static str;

    /// Round-trip to the store to prove it is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Every document of `collection`, in insertion order.
    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str) -> StoreResult<u64>;

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId>;

    /// Bulk insert in one call. Partial-failure semantics follow the backend:
    /// on error, documents committed before the failure stay committed.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>>;

    /// Insert-or-replace keyed on the value of `key_field` in each document.
    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary>;
}

/// String form of an upsert key. Only scalar values can key a document.
pub fn upsert_key(document: &Document, key_field: &str) -> Option<String> {
    match document.fields.get(key_field)? {
        serde_json::Value::String(v) => Some(v.clone()),
        serde_json::Value::Number(v) => Some(v.to_string()),
        serde_json::Value::Bool(v) => Some(v.to_string()),
        _ => None,
    }
}
