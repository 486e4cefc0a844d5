#![forbid(unsafe_code)]

//! # synthetic-students
//!
//! Calibrate multiple-choice items before real students see them.
//!
//! A calibration run asks an LLM to answer every item in the voice of
//! several student personas of different ability. The answers are parsed
//! into option letters and persisted, and classical test theory statistics
//! (difficulty, point-biserial discrimination, distractor functioning) are
//! computed from them to flag items that are too easy, too hard, or do not
//! separate strong students from weak ones. The same statistics over real
//! human responses serve as the reference that synthetic runs are
//! correlated against.

pub mod analysis;
pub mod answer;
pub mod calibration;
pub mod config;
pub mod gateway;
pub mod items;
pub mod personas;
pub mod statistics;
pub mod store;
pub mod tokens;

pub use answer::parse_answer;
pub use calibration::{
    run_calibration, CalibrationError, CalibrationObserver, CalibrationPlan, CalibrationSummary,
    JsonlTraceSink, ProgressEvent, SkipReason, SkippedCell,
};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use items::{Item, ItemFilter, OptionKey};
pub use personas::{Persona, PersonaSet};
pub use statistics::{compute_run_statistics, correlate, Correlation, ItemStatistics};
pub use store::{CalibrationRepository, MemoryStore, SqliteStore};
