//! JSONL trace of every cell outcome in a calibration run.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::events::{CalibrationObserver, SkippedCell};
use crate::items::OptionKey;
use crate::store::ResponseRecord;

#[derive(Debug, Clone, Serialize)]
pub struct CellTrace {
    pub timestamp_ms: i64,
    pub run_id: Option<String>,
    pub item_id: String,
    pub persona_id: String,
    pub trial: u32,
    pub outcome: &'static str,
    pub selected: Option<OptionKey>,
    pub is_correct: Option<bool>,
    pub latency_ms: Option<u64>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: Option<String>,
    pub error: Option<String>,
}

impl CellTrace {
    pub fn recorded(record: &ResponseRecord) -> Self {
        Self {
            timestamp_ms: now_epoch_ms(),
            run_id: Some(record.run_id.clone()),
            item_id: record.item_id.clone(),
            persona_id: record.persona_id.clone(),
            trial: record.trial,
            outcome: "recorded",
            selected: Some(record.selected),
            is_correct: Some(record.is_correct),
            latency_ms: Some(record.latency_ms),
            input_tokens: record.input_tokens,
            output_tokens: record.output_tokens,
            model: Some(record.model.clone()),
            error: None,
        }
    }

    pub fn skipped(cell: &SkippedCell) -> Self {
        let error = match &cell.reason {
            super::SkipReason::ParseFailure => None,
            super::SkipReason::AdapterError { code } => Some(code.clone()),
            super::SkipReason::Storage { message } => Some(message.clone()),
        };
        Self {
            timestamp_ms: now_epoch_ms(),
            run_id: None,
            item_id: cell.item_id.clone(),
            persona_id: cell.persona_id.clone(),
            trial: cell.trial,
            outcome: cell.reason.as_str(),
            selected: None,
            is_correct: None,
            latency_ms: None,
            input_tokens: 0,
            output_tokens: 0,
            model: None,
            error,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: CellTrace) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<CellTrace>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Drop every sink clone first.
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<CellTrace>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: CellTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

impl CalibrationObserver for JsonlTraceSink {
    fn on_response(&self, record: &ResponseRecord) {
        if let Err(e) = self.record(CellTrace::recorded(record)) {
            tracing::warn!(error = %e, "Failed to write cell trace");
        }
    }

    fn on_skip(&self, cell: &SkippedCell) {
        if let Err(e) = self.record(CellTrace::skipped(cell)) {
            tracing::warn!(error = %e, "Failed to write cell trace");
        }
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<CellTrace>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
