//! Document model and the contract every document store backend implements.

mod document_model;
mod document_store;
mod memory_store;

pub use document_model::*;
pub use document_store::*;
pub use memory_store::MemoryStore;
