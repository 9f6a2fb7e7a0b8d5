//! Response model: the outcome of one dispatched request.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorEnvelope, ErrorKind};

/// Additive counters reported by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Produced paths. No ordering guarantee.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Summary {
    /// Fold another summary into this one.
    pub fn merge(&mut self, other: Summary) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.outputs.extend(other.outputs);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Outcome of a dispatch.
///
/// Built only through [`Response::success`] and [`Response::failure`], so
/// `ok == true` always implies `error == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    pub task_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl Response {
    pub fn success(task_id: impl Into<String>, summary: Summary) -> Self {
        Self {
            ok: true,
            task_id: task_id.into(),
            status: ResponseStatus::Success,
            summary: Some(summary),
            error: None,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: ErrorEnvelope) -> Self {
        Self {
            ok: false,
            task_id: task_id.into(),
            status: ResponseStatus::Failed,
            summary: None,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.code)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.ok && self.error_code() == Some(ErrorKind::Cancelled)
    }
}
