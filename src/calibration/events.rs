//! Observable outcomes of a calibration sweep.

use serde::Serialize;

use crate::store::ResponseRecord;

/// Snapshot emitted after every attempted cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Response records persisted so far.
    pub completed: u64,
    /// Cells whose generation call has returned.
    pub attempted: u64,
    pub total: u64,
    pub current_item: String,
    pub current_persona: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The reply held no recognizable option letter.
    ParseFailure,
    /// The adapter gave up; carries the provider error code.
    AdapterError { code: String },
    /// The record could not be persisted.
    Storage { message: String },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseFailure => "parse_failure",
            Self::AdapterError { .. } => "adapter_error",
            Self::Storage { .. } => "storage",
        }
    }
}

/// A cell that produced no response record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCell {
    pub item_id: String,
    pub persona_id: String,
    pub trial: u32,
    pub reason: SkipReason,
}

/// Synchronous callbacks invoked from the sweep task.
///
/// Implementations must not block for long and cannot fail the sweep.
pub trait CalibrationObserver: Send + Sync {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_response(&self, _record: &ResponseRecord) {}

    fn on_skip(&self, _cell: &SkippedCell) {}
}
