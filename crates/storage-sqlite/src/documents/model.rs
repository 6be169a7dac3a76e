//! Database models for the documents table.

use diesel::prelude::*;

use bienestar_core::documents::{Document, DocumentId, Fields};

use crate::errors::Result;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentDB {
    pub seq: i64,
    pub id: String,
    pub collection: String,
    pub body: String,
    pub natural_key: Option<String>,
    pub created_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::documents)]
pub struct NewDocumentDB {
    pub id: String,
    pub collection: String,
    pub body: String,
    pub natural_key: Option<String>,
    pub created_at: String,
}

impl NewDocumentDB {
    /// Keeps the document id when present, otherwise assigns a fresh one.
    pub fn from_document(
        collection: &str,
        document: Document,
        natural_key: Option<String>,
        created_at: &str,
    ) -> Result<Self> {
        let id = document.id.unwrap_or_else(DocumentId::generate);
        Ok(Self {
            id: id.to_string(),
            collection: collection.to_string(),
            body: serde_json::to_string(&document.fields)?,
            natural_key,
            created_at: created_at.to_string(),
        })
    }
}

impl TryFrom<DocumentDB> for Document {
    type Error = crate::errors::StorageError;

    fn try_from(row: DocumentDB) -> Result<Self> {
        let fields: Fields = serde_json::from_str(&row.body)?;
        Ok(Document::with_id(DocumentId::new(row.id), fields))
    }
}
