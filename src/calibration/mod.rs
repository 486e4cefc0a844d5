//! Calibration sweeps: every item answered by every persona, `trials` times.
//!
//! A [`CalibrationPlan`] fixes the items, personas, model and pacing. The
//! sweep itself lives in [`run_calibration`]; it persists one
//! [`ResponseRecord`](crate::store::ResponseRecord) per parsed answer and
//! reports everything else as a [`SkippedCell`].

pub mod events;
pub mod pacing;
pub mod runner;
pub mod trace;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_DELAY_MS};
use crate::gateway::{estimate_run_cost, nanos_to_usd, CostEstimate};
use crate::items::{Item, ItemError};
use crate::personas::{Persona, PersonaError};
use crate::store::StoreError;
use crate::tokens::average_prompt_tokens;

pub use events::{CalibrationObserver, ProgressEvent, SkipReason, SkippedCell};
pub use pacing::Pacer;
pub use runner::run_calibration;
pub use trace::{CellTrace, JsonlTraceSink, TraceError, TraceSink, TraceWorker};

/// Completion budget for a single answer.
pub const MAX_OUTPUT_TOKENS: u32 = 500;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid calibration plan: {0}")]
    Config(String),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Persona(#[from] PersonaError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CalibrationPlan {
    pub items: Vec<Item>,
    pub personas: Vec<Persona>,
    pub trials: u32,
    pub model: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Human-readable description of how the items were selected.
    pub item_filter: Option<String>,
    /// Minimum spacing between call starts.
    pub delay: Duration,
    /// Calls in flight at once. 1 runs the sweep strictly sequentially.
    pub concurrency: usize,
}

impl CalibrationPlan {
    pub fn new(items: Vec<Item>, personas: Vec<Persona>, model: impl Into<String>) -> Self {
        Self {
            items,
            personas,
            trials: 1,
            model: model.into(),
            name: None,
            description: None,
            item_filter: None,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn item_filter(mut self, filter: Option<String>) -> Self {
        self.item_filter = filter;
        self
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.items.is_empty() {
            return Err(CalibrationError::Config("no items selected".into()));
        }
        if self.personas.is_empty() {
            return Err(CalibrationError::Config("no personas enabled".into()));
        }
        if self.trials == 0 {
            return Err(CalibrationError::Config("trials must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(CalibrationError::Config(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(CalibrationError::Config("model id is empty".into()));
        }
        for item in &self.items {
            item.validate()?;
        }
        for persona in &self.personas {
            persona.validate()?;
        }
        Ok(())
    }

    /// Theoretical maximum number of response records.
    pub fn total_cells(&self) -> u64 {
        self.items.len() as u64 * self.personas.len() as u64 * self.trials as u64
    }

    /// A-priori cost range using the given average token counts.
    pub fn estimate(&self, avg_input_tokens: u32, avg_output_tokens: u32) -> CostEstimate {
        estimate_run_cost(
            &self.model,
            self.items.len(),
            self.personas.len(),
            self.trials,
            avg_input_tokens,
            avg_output_tokens,
        )
    }

    /// Like [`estimate`](Self::estimate), with the input size measured from
    /// the actual prompts.
    pub fn estimate_from_prompts(&self, avg_output_tokens: u32) -> CostEstimate {
        let avg_input = average_prompt_tokens(&self.items, &self.personas)
            .unwrap_or(crate::gateway::DEFAULT_AVG_INPUT_TOKENS);
        self.estimate(avg_input, avg_output_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub run_id: String,
    pub responses: u64,
    pub max_responses: u64,
    pub skipped_parse: u64,
    pub skipped_adapter: u64,
    pub skipped_storage: u64,
    /// Cells never attempted because the sweep was cancelled.
    pub not_attempted: u64,
    pub total_cost_nanodollars: i64,
    pub duration: Duration,
    pub cancelled: bool,
}

impl CalibrationSummary {
    pub fn skipped(&self) -> u64 {
        self.skipped_parse + self.skipped_adapter + self.skipped_storage
    }

    pub fn total_cost_usd(&self) -> f64 {
        nanos_to_usd(self.total_cost_nanodollars)
    }
}

impl std::fmt::Display for CalibrationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {}: {}/{} responses, {} skipped, ${:.4}, {:.1}s",
            self.run_id,
            self.responses,
            self.max_responses,
            self.skipped(),
            self.total_cost_usd(),
            self.duration.as_secs_f64()
        )?;
        if self.cancelled {
            write!(f, " (cancelled, {} cells not attempted)", self.not_attempted)?;
        }
        Ok(())
    }
}
