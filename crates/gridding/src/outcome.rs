//! Per-spec and per-item results reported by the pipeline.
//!
//! These are serialized as JSON between a worker process and the scheduler,
//! so they only carry plain data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result of one grid spec for one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecOutcome {
    /// A new product was written.
    Success { spec: String, path: PathBuf },
    /// The product already existed and was left untouched.
    SkippedExists { spec: String, path: PathBuf },
    /// Gridding or persisting failed; other specs were unaffected.
    GridFailure { spec: String, reason: String },
}

impl SpecOutcome {
    pub fn spec(&self) -> &str {
        match self {
            SpecOutcome::Success { spec, .. }
            | SpecOutcome::SkippedExists { spec, .. }
            | SpecOutcome::GridFailure { spec, .. } => spec,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SpecOutcome::GridFailure { .. })
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SpecOutcome::Success { .. } => "success",
            SpecOutcome::SkippedExists { .. } => "skipped_exists",
            SpecOutcome::GridFailure { .. } => "grid_failure",
        }
    }
}

/// Result of processing one work item, as printed by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemReport {
    /// The volume was read; one outcome per spec in catalog order.
    Processed {
        specs: Vec<SpecOutcome>,
        elapsed_ms: u64,
    },
    /// The volume could not be read or was unusable; no products written.
    ReadFailure { reason: String },
    /// The worker hit an unexpected error or panic.
    Raised { message: String },
}

impl ItemReport {
    /// Parse the report line printed by a worker.
    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Single-line JSON form.
    pub fn to_line(&self) -> String {
        // Serializing plain enums of strings and paths cannot fail.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"raised","message":"unserializable report: {}"}}"#, e)
        })
    }
}
