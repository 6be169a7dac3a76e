//! Persists one survey submission as per-category partial records plus a
//! full summary record.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use super::{get_assignment, question_field, CategoryAssignment, SUMMARY_COLLECTION};
use crate::documents::{
    timestamp_now, Document, DocumentStore, Fields, ID_FIELD, TIMESTAMP_FIELD,
};
use crate::errors::{Error, Result, StoreResult};

/// Result of one insert performed for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionWrite {
    pub collection: String,
    pub document_id: Option<String>,
    pub error: Option<String>,
}

impl CollectionWrite {
    fn from_result(collection: &str, result: StoreResult<crate::documents::DocumentId>) -> Self {
        match result {
            Ok(id) => Self {
                collection: collection.to_string(),
                document_id: Some(id.to_string()),
                error: None,
            },
            Err(err) => Self {
                collection: collection.to_string(),
                document_id: None,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Every insert attempted for one submission. Inserts are committed
/// independently, so any subset may have landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub writes: Vec<CollectionWrite>,
}

impl SubmissionReceipt {
    pub fn is_complete(&self) -> bool {
        self.writes.iter().all(CollectionWrite::succeeded)
    }

    pub fn written_collections(&self) -> Vec<&str> {
        self.writes
            .iter()
            .filter(|w| w.succeeded())
            .map(|w| w.collection.as_str())
            .collect()
    }

    pub fn failed_collections(&self) -> Vec<&str> {
        self.writes
            .iter()
            .filter(|w| !w.succeeded())
            .map(|w| w.collection.as_str())
            .collect()
    }
}

/// Partial record for one category. Missing answers become `null`.
pub fn build_category_record(payload: &Fields, questions: &[u32], fecha: &str) -> Fields {
    let mut record = Fields::new();
    record.insert(TIMESTAMP_FIELD.to_string(), fecha.into());
    for &number in questions {
        let key = question_field(number);
        let value = payload.get(&key).cloned().unwrap_or(serde_json::Value::Null);
        record.insert(key, value);
    }
    record
}

/// Whole payload plus the timestamp. A payload `fecha` is overwritten.
pub fn build_summary_record(payload: &Fields, fecha: &str) -> Fields {
    let mut record = payload.clone();
    record.insert(TIMESTAMP_FIELD.to_string(), fecha.into());
    record
}

/// Accepts only a JSON object as a submission payload. `_id` is reserved
/// for the identifier the store assigns.
pub fn payload_from_json(value: serde_json::Value) -> Result<Fields> {
    match value {
        serde_json::Value::Object(map) if map.contains_key(ID_FIELD) => Err(
            Error::MalformedPayload(format!("'{}' is a reserved key", ID_FIELD)),
        ),
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub struct RecordWriter {
    store: Arc<dyn DocumentStore>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// One insert per category. Every category is attempted even if an
    /// earlier one fails; nothing is rolled back.
    pub async fn write_by_category(
        &self,
        payload: &Fields,
        assignment: &[CategoryAssignment],
    ) -> Vec<CollectionWrite> {
        let fecha = timestamp_now();
        let mut writes = Vec::with_capacity(assignment.len());
        for category in assignment {
            let record = build_category_record(payload, category.questions, &fecha);
            let result = self
                .store
                .insert_one(category.collection, Document::new(record))
                .await;
            if let Err(err) = &result {
                warn!("[Survey] Insert into '{}' failed: {}", category.collection, err);
            }
            writes.push(CollectionWrite::from_result(category.collection, result));
        }
        writes
    }

    pub async fn write_summary(&self, payload: &Fields) -> CollectionWrite {
        let record = build_summary_record(payload, &timestamp_now());
        let result = self
            .store
            .insert_one(SUMMARY_COLLECTION, Document::new(record))
            .await;
        if let Err(err) = &result {
            warn!("[Survey] Insert into '{}' failed: {}", SUMMARY_COLLECTION, err);
        }
        CollectionWrite::from_result(SUMMARY_COLLECTION, result)
    }

    /// Writes both the category records and the summary for one submission.
    pub async fn submit(&self, payload: &Fields) -> SubmissionReceipt {
        let mut writes = self.write_by_category(payload, get_assignment()).await;
        writes.push(self.write_summary(payload).await);
        let receipt = SubmissionReceipt { writes };
        debug!(
            "[Survey] Submission stored written={:?} failed={:?}",
            receipt.written_collections(),
            receipt.failed_collections()
        );
        receipt
    }
}
