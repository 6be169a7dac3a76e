//! Domain layer for the wellbeing survey: document model, store contract,
//! survey record writer and the collection mirror.
//!
//! Backends live in their own crates (`bienestar-storage-mongo`,
//! `bienestar-storage-sqlite`) and plug in through [`documents::DocumentStore`].

pub mod documents;
pub mod errors;
pub mod survey;
pub mod sync;

pub use errors::{Error, Result, StoreError, StoreResult};
