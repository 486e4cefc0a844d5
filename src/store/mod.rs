//! Persistence for calibration runs, response records and item statistics.
//!
//! The calibration sweep and the statistics commands only see the
//! [`CalibrationRepository`] trait. [`SqliteStore`] is the durable
//! implementation; [`MemoryStore`] backs tests and dry runs.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::items::{Item, OptionKey};
use crate::statistics::{ItemStatistics, ScoredResponse};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(String),
    #[error("store closed")]
    Closed,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt row: {0}")]
    Decode(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            other => Err(StoreError::Decode(format!("run status {other:?}"))),
        }
    }
}

/// Everything known about a run when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: String,
    pub persona_ids: Vec<String>,
    pub item_filter: Option<String>,
    pub n_items: usize,
    pub n_personas: usize,
    pub n_trials: u32,
    pub started_at: DateTime<Utc>,
}

/// Aggregates written once when a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total_responses: u64,
    pub total_cost_usd: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: String,
    pub persona_ids: Vec<String>,
    pub item_filter: Option<String>,
    pub n_items: usize,
    pub n_personas: usize,
    pub n_trials: u32,
    pub status: RunStatus,
    pub total_responses: Option<u64>,
    pub total_cost_usd: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CalibrationRun {
    pub fn from_new(run: NewRun) -> Self {
        Self {
            id: run.id,
            name: run.name,
            description: run.description,
            model: run.model,
            persona_ids: run.persona_ids,
            item_filter: run.item_filter,
            n_items: run.n_items,
            n_personas: run.n_personas,
            n_trials: run.n_trials,
            status: RunStatus::Running,
            total_responses: None,
            total_cost_usd: None,
            started_at: run.started_at,
            completed_at: None,
        }
    }

    pub fn finish(&mut self, totals: &RunTotals) {
        self.status = RunStatus::Completed;
        self.total_responses = Some(totals.total_responses);
        self.total_cost_usd = Some(totals.total_cost_usd);
        self.completed_at = Some(totals.completed_at);
    }

    /// Theoretical maximum number of response records.
    pub fn max_responses(&self) -> u64 {
        self.n_items as u64 * self.n_personas as u64 * self.n_trials as u64
    }
}

/// One parsed answer from a simulated student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub run_id: String,
    pub item_id: String,
    pub persona_id: String,
    pub trial: u32,
    pub selected: OptionKey,
    pub is_correct: bool,
    /// Raw model reply the answer was parsed from.
    pub rationale: String,
    pub latency_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
}

impl ResponseRecord {
    /// Synthetic respondents are persona/trial pairs; response variance groups
    /// by persona.
    pub fn scored(&self) -> ScoredResponse {
        ScoredResponse {
            item_id: self.item_id.clone(),
            respondent: format!("{}#{}", self.persona_id, self.trial),
            group: self.persona_id.clone(),
            selected: self.selected,
            is_correct: self.is_correct,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFilter {
    pub run_id: Option<String>,
    pub item_id: Option<String>,
    pub persona_id: Option<String>,
}

impl ResponseFilter {
    pub fn run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, r: &ResponseRecord) -> bool {
        self.run_id.as_deref().map_or(true, |v| v == r.run_id)
            && self.item_id.as_deref().map_or(true, |v| v == r.item_id)
            && self.persona_id.as_deref().map_or(true, |v| v == r.persona_id)
    }
}

/// An answer from a real test-taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanResponse {
    pub item_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub selected: OptionKey,
    pub is_correct: bool,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl HumanResponse {
    /// Anonymous answers each count as their own respondent.
    pub fn scored(&self, row: usize) -> ScoredResponse {
        let respondent = self
            .user_id
            .clone()
            .unwrap_or_else(|| format!("anon-{row}"));
        ScoredResponse {
            item_id: self.item_id.clone(),
            group: respondent.clone(),
            respondent,
            selected: self.selected,
            is_correct: self.is_correct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum StatisticsSource {
    Synthetic { run_id: String },
    Human,
}

impl StatisticsSource {
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Synthetic { .. } => "synthetic",
            Self::Human => "human",
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Synthetic { run_id } => Some(run_id),
            Self::Human => None,
        }
    }
}

/// Result of comparing a run against reference statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub run_id: String,
    pub n_items_compared: usize,
    pub n_human_responses: usize,
    pub difficulty_correlation: f64,
    pub discrimination_correlation: f64,
    pub difficulty_mae: f64,
    pub difficulty_bias: f64,
}

/// Storage operations the calibration sweep and statistics engine rely on.
#[async_trait]
pub trait CalibrationRepository: Send + Sync {
    async fn create_run(&self, run: &NewRun) -> Result<(), StoreError>;

    /// Record totals and mark the run completed.
    async fn finish_run(&self, run_id: &str, totals: &RunTotals) -> Result<(), StoreError>;

    async fn insert_response(&self, record: &ResponseRecord) -> Result<(), StoreError>;

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError>;

    async fn get_responses(&self, filter: &ResponseFilter)
        -> Result<Vec<ResponseRecord>, StoreError>;

    async fn insert_statistics(
        &self,
        stats: &ItemStatistics,
        source: &StatisticsSource,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(persona: &str, trial: u32) -> ResponseRecord {
        ResponseRecord {
            run_id: "r".into(),
            item_id: "q".into(),
            persona_id: persona.into(),
            trial,
            selected: OptionKey::A,
            is_correct: true,
            rationale: "A".into(),
            latency_ms: 1,
            input_tokens: 1,
            output_tokens: 1,
            model: "m".into(),
        }
    }

    #[test]
    fn synthetic_respondent_is_persona_and_trial() {
        let s = record("novice", 2).scored();
        assert_eq!(s.respondent, "novice#2");
        assert_eq!(s.group, "novice");
    }

    #[test]
    fn filter_matches_all_set_fields() {
        let r = record("expert", 1);
        assert!(ResponseFilter::default().matches(&r));
        assert!(ResponseFilter::run("r").matches(&r));
        let f = ResponseFilter {
            persona_id: Some("novice".into()),
            ..ResponseFilter::run("r")
        };
        assert!(!f.matches(&r));
    }

    #[test]
    fn human_respondents() {
        let h = HumanResponse {
            item_id: "q".into(),
            user_id: None,
            selected: OptionKey::C,
            is_correct: false,
            latency_ms: None,
            source: None,
        };
        assert_eq!(h.scored(7).respondent, "anon-7");
        let named = HumanResponse {
            user_id: Some("u1".into()),
            ..h
        };
        assert_eq!(named.scored(7).respondent, "u1");
    }

    #[test]
    fn max_responses_is_the_full_product() {
        let run = CalibrationRun::from_new(NewRun {
            id: "x".into(),
            name: None,
            description: None,
            model: "m".into(),
            persona_ids: vec!["a".into(), "b".into()],
            item_filter: None,
            n_items: 3,
            n_personas: 2,
            n_trials: 4,
            started_at: Utc::now(),
        });
        assert_eq!(run.max_responses(), 24);
        assert_eq!(run.status, RunStatus::Running);
    }
}
