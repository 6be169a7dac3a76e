//! In-process document store. Backs `memory://` URIs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{upsert_key, Document, DocumentId, DocumentStore, UpsertSummary};
use crate::errors::{StoreError, StoreResult};

type Collections = HashMap<String, Vec<Document>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_guard(&self) -> StoreResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| StoreError::connection("Memory store lock is poisoned"))
    }

    fn write_guard(&self) -> StoreResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StoreError::connection("Memory store lock is poisoned"))
    }

    /// Ordered insert: stops at the first rejected document and keeps what
    /// was inserted before it, like an ordered bulk insert on a server.
    fn insert_ordered(
        collections: &mut Collections,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        let docs = collections.entry(collection.to_string()).or_default();
        let mut taken = docs
            .iter()
            .filter_map(|d| d.id.clone())
            .collect::<HashSet<_>>();
        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let id = document.id.clone().unwrap_or_else(DocumentId::generate);
            if !taken.insert(id.clone()) {
                return Err(StoreError::write(
                    collection,
                    Some(ids.len()),
                    format!("duplicate key: _id '{}' already exists", id),
                ));
            }
            docs.push(Document::with_id(id.clone(), document.fields));
            ids.push(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.read_guard().map(|_| ())
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let guard = self.read_guard()?;
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let guard = self.read_guard()?;
        Ok(guard.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        let mut guard = self.write_guard()?;
        let mut ids = Self::insert_ordered(&mut guard, collection, vec![document])?;
        ids.pop()
            .ok_or_else(|| StoreError::write(collection, Some(0), "no id assigned"))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        let mut guard = self.write_guard()?;
        Self::insert_ordered(&mut guard, collection, documents)
    }

    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary> {
        let mut guard = self.write_guard()?;
        let docs = guard.entry(collection.to_string()).or_default();
        let mut summary = UpsertSummary::default();

        for document in documents {
            let key = upsert_key(&document, key_field).ok_or_else(|| {
                StoreError::invalid_document(format!(
                    "document has no scalar '{}' to upsert on",
                    key_field
                ))
            })?;
            let existing = docs
                .iter_mut()
                .find(|d| upsert_key(d, key_field).as_deref() == Some(key.as_str()));
            match existing {
                Some(current) => {
                    current.fields = document.fields;
                    summary.replaced += 1;
                }
                None => {
                    docs.push(Document::with_id(DocumentId::generate(), document.fields));
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }
}
