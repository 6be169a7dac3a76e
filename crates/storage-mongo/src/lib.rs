//! MongoDB-API document store. Works against MongoDB Atlas and any service
//! speaking the same wire protocol (Cosmos DB for MongoDB included).

mod convert;
pub mod errors;
mod store;

pub use convert::{from_bson_document, to_bson_document};
pub use errors::{MongoStoreError, Result};
pub use store::MongoDocumentStore;
