use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;

use bienestar_core::documents::{
    timestamp_now, upsert_key, Document, DocumentId, DocumentStore, UpsertSummary,
};
use bienestar_core::{StoreError, StoreResult};

use super::model::{DocumentDB, NewDocumentDB};
use crate::db::{self, get_connection, DbPool, WriteHandle};
use crate::errors::{Result, StorageError};
use crate::schema::documents;

pub struct SqliteDocumentStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteDocumentStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteDocumentStore { pool, writer }
    }

    /// Creates the database file if needed, migrates it and starts the writer.
    pub fn open(db_path: &str) -> Result<Self> {
        let db_path = db::init(db_path)?;
        db::run_migrations(&db_path)?;
        let pool = db::create_pool(&db_path)?;
        let writer = db::spawn_writer(pool.as_ref().clone())?;
        debug!("Opened SQLite document store at {}", db_path);
        Ok(Self::new(pool, writer))
    }

    fn load_collection_impl(pool: &DbPool, name: &str) -> Result<Vec<Document>> {
        let mut conn = get_connection(pool)?;
        documents::table
            .filter(documents::collection.eq(name))
            .order(documents::seq.asc())
            .select(DocumentDB::as_select())
            .load::<DocumentDB>(&mut conn)?
            .into_iter()
            .map(Document::try_from)
            .collect()
    }

    fn count_impl(pool: &DbPool, name: &str) -> Result<i64> {
        let mut conn = get_connection(pool)?;
        Ok(documents::table
            .filter(documents::collection.eq(name))
            .count()
            .get_result::<i64>(&mut conn)?)
    }

    fn ping_impl(pool: &DbPool) -> Result<()> {
        let mut conn = get_connection(pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DbPool) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || f(&pool))
            .await
            .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

fn insert_rows(
    conn: &mut SqliteConnection,
    name: &str,
    docs: Vec<Document>,
) -> Result<Vec<DocumentId>> {
    let now = timestamp_now();
    let rows = docs
        .into_iter()
        .map(|doc| NewDocumentDB::from_document(name, doc, None, &now))
        .collect::<Result<Vec<_>>>()?;
    for row in &rows {
        diesel::insert_into(documents::table)
            .values(row)
            .execute(conn)?;
    }
    Ok(rows.into_iter().map(|row| DocumentId::new(row.id)).collect())
}

fn upsert_rows(
    conn: &mut SqliteConnection,
    name: &str,
    key_field: &str,
    docs: Vec<Document>,
) -> Result<UpsertSummary> {
    let now = timestamp_now();
    let mut summary = UpsertSummary::default();
    for doc in docs {
        let key = upsert_key(&doc, key_field).ok_or_else(|| {
            StorageError::InvalidDocument(format!(
                "document has no scalar '{}' to upsert on",
                key_field
            ))
        })?;
        let body = serde_json::to_string(&doc.fields)?;
        let replaced = diesel::update(
            documents::table
                .filter(documents::collection.eq(name))
                .filter(documents::natural_key.eq(&key)),
        )
        .set(documents::body.eq(&body))
        .execute(conn)?;

        if replaced > 0 {
            summary.replaced += 1;
        } else {
            let row = NewDocumentDB::from_document(name, doc.without_id(), Some(key), &now)?;
            diesel::insert_into(documents::table)
                .values(&row)
                .execute(conn)?;
            summary.inserted += 1;
        }
    }
    Ok(summary)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.blocking(Self::ping_impl)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let name = collection.to_string();
        self.blocking(move |pool| Self::load_collection_impl(pool, &name))
            .await
            .map_err(|e| e.into_read_error(collection))
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let name = collection.to_string();
        let count = self
            .blocking(move |pool| Self::count_impl(pool, &name))
            .await
            .map_err(|e| e.into_read_error(collection))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        let mut ids = self.insert_many(collection, vec![document]).await?;
        ids.pop()
            .ok_or_else(|| StoreError::write(collection, Some(0), "no id assigned"))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<DocumentId>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let name = collection.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| insert_rows(conn, &name, documents))
            .await
            .map_err(|e| e.into_write_error(collection))
    }

    async fn upsert_many(
        &self,
        collection: &str,
        key_field: &str,
        documents: Vec<Document>,
    ) -> StoreResult<UpsertSummary> {
        let name = collection.to_string();
        let key_field = key_field.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| {
                upsert_rows(conn, &name, &key_field, documents)
            })
            .await
            .map_err(|e| e.into_write_error(collection))
    }
}
