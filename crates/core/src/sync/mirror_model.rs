//! Collection mirror domain models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::StoreRetryClass;

/// Database holding the survey collections on both stores.
pub const DEFAULT_DATABASE: &str = "cuestionario_bienestar";

/// Canonical, ordered list of collections mirrored from source to destination.
pub const MIRROR_COLLECTIONS: [&str; 6] = [
    "Estado_Emocional",
    "Condiciones_de_Entorno",
    "Apoyo_Social",
    "Balance_Vida_y_Trabajo",
    "Evaluacion_General",
    "Resumen_Completo",
];

/// Destination field carrying the source identifier in upsert mode.
pub const ORIGIN_ID_FIELD: &str = "origen_id";

/// How mirrored documents are written to the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorMode {
    /// Bulk insert with fresh identifiers. Re-running duplicates everything.
    #[default]
    Append,
    /// Upsert keyed on [`ORIGIN_ID_FIELD`]. Re-running is a no-op on an unchanged source.
    Upsert,
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::Upsert => f.write_str("upsert"),
        }
    }
}

impl FromStr for MirrorMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!("Unknown mirror mode '{}'", other)),
        }
    }
}

/// Synchronizer lifecycle: `Idle -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Trigger source for mirror runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorTrigger {
    Startup,
    Periodic,
    Manual,
}

/// Result of mirroring one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionOutcome {
    /// `count` documents written to the destination.
    Synced { count: usize },
    /// Source collection was empty; destination untouched.
    Skipped,
    Failed {
        cause: String,
        retry_class: StoreRetryClass,
    },
    /// Run was cancelled before this collection started.
    Cancelled,
}

impl CollectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Synced { .. } | Self::Skipped)
    }
}

/// Per-collection entry of a [`MirrorReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub collection: String,
    #[serde(flatten)]
    pub outcome: CollectionOutcome,
    pub attempts: u32,
    pub duration_ms: i64,
}

/// Aggregated result of a full catalog run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorReport {
    pub trigger: MirrorTrigger,
    pub mode: MirrorMode,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: i64,
    pub collections: Vec<CollectionReport>,
}

impl MirrorReport {
    /// Every collection was synced or skipped.
    pub fn is_success(&self) -> bool {
        self.collections.iter().all(|c| c.outcome.is_success())
    }

    pub fn final_state(&self) -> MirrorState {
        if self.is_success() {
            MirrorState::Completed
        } else {
            MirrorState::Failed
        }
    }

    pub fn synced_documents(&self) -> usize {
        self.collections
            .iter()
            .map(|c| match c.outcome {
                CollectionOutcome::Synced { count } => count,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_collections(&self) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|c| !c.outcome.is_success())
            .map(|c| c.collection.as_str())
            .collect()
    }
}
