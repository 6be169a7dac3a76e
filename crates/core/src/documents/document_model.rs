use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Field map of a schema-flexible document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Field holding the creation instant of every record written by the survey.
pub const TIMESTAMP_FIELD: &str = "fecha";

/// Reserved field name stores use for their own identifier.
pub const ID_FIELD: &str = "_id";

/// Store-assigned identifier. Opaque and only meaningful inside the store
/// that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh identifier for stores that generate ids client-side.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A document: arbitrary fields plus the identifier of the store it was read from.
///
/// Documents read from a store always carry `Some(id)`. Documents about to be
/// inserted normally carry `None` and the store assigns one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    pub fn new(fields: Fields) -> Self {
        Self { id: None, fields }
    }

    pub fn with_id(id: DocumentId, fields: Fields) -> Self {
        Self {
            id: Some(id),
            fields,
        }
    }

    /// Drops the store-assigned identifier so the next store assigns its own.
    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Current instant in the text form stored under [`TIMESTAMP_FIELD`].
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
