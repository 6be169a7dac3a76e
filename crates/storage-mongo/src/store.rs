use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson};
use futures::TryStreamExt;
use log::{debug, info};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};

use bienestar_core::documents::{
    upsert_key, Document, DocumentId, DocumentStore, UpsertSummary,
};
use bienestar_core::{StoreError, StoreResult};

use crate::convert::{from_bson_document, id_from_bson, to_bson_document, value_to_bson};
use crate::errors::{MongoStoreError, Result};

const APP_NAME: &str = "bienestar";
const SERVER_SELECTION_TIMEOUT_SECS: u64 = 10;

pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Builds a client for `uri` bound to `database`. The driver connects
    /// lazily, so reachability is only proven by [`DocumentStore::ping`].
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout =
            Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));
        let client = Client::with_options(options)?;
        let database = client.database(database);
        info!(
            "[Mongo] Client ready for database '{}'",
            database.name()
        );
        Ok(Self { database })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.database.collection::<bson::Document>(name)
    }

    async fn load(&self, name: &str) -> Result<Vec<Document>> {
        let cursor = self.collection(name).find(doc! {}).await?;
        let raw: Vec<bson::Document> = cursor.try_collect().await?;
        Ok(raw.into_iter().map(from_bson_document).collect())
    }

    async fn insert_batch(&self, name: &str, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        let batch = documents
            .into_iter()
            .map(to_bson_document)
            .collect::<Result<Vec<_>>>()?;
        let result = self.collection(name).insert_many(batch).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.iter().map(|(_, id)| id_from_bson(id)).collect())
    }

    async fn upsert_batch(
        &self,
        name: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> Result<UpsertSummary> {
        let collection = self.collection(name);
        let mut summary = UpsertSummary::default();
        for document in documents {
            let key = match (upsert_key(&document, key_field), document.get(key_field)) {
                (Some(_), Some(value)) => value.clone(),
                _ => {
                    return Err(MongoStoreError::Conversion(format!(
                        "document has no scalar '{}' to upsert on",
                        key_field
                    )))
                }
            };
            let mut filter = bson::Document::new();
            filter.insert(key_field, value_to_bson(key_field, key)?);
            let replacement = to_bson_document(document.without_id())?;
            let result = collection
                .replace_one(filter, replacement)
                .upsert(true)
                .await?;
            if result.upserted_id.is_some() {
                summary.inserted += 1;
            } else {
                summary.replaced += 1;
            }
        }
        Ok(summary)
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| StoreError::connection(e.to_string()))
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let documents = self
            .load(collection)
            .await
            .map_err(|e| e.into_read_error(collection))?;
        debug!(
            "[Mongo] Read {} documents from '{}'",
            documents.len(),
            collection
        );
        Ok(documents)
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        self.collection(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| MongoStoreError::from(e).into_read_error(collection))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        let raw = to_bson_document(document).map_err(|e| e.into_write_error(collection))?;
        let result = self
            .collection(collection)
            .insert_one(raw)
            .await
            .map_err(|e| MongoStoreError::from(e).into_write_error(collection))?;
        Ok(id_from_bson(&result.inserted_id))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_batch(collection, documents)
            .await
            .map_err(|e| e.into_write_error(collection))
    }

    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary> {
        self.upsert_batch(collection, key_field, documents)
            .await
            .map_err(|e| e.into_write_error(collection))
    }
}

impl std::fmt::Debug for MongoDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDocumentStore")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}
