//! SQLite document store: schema-flexible documents kept as JSON text in a
//! single `documents` table, one logical collection per `collection` value.

pub mod db;
pub mod documents;
pub mod errors;
pub mod schema;

pub use documents::SqliteDocumentStore;
pub use errors::{Result, StorageError};
