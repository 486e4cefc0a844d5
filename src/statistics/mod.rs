//! Classical test theory statistics over response records.

pub mod classical;
pub mod correlation;
pub mod report;

pub use classical::{
    compute_item_statistics, compute_run_statistics, ItemFlag, ItemStatistics, OptionRates,
    ScoredResponse,
};
pub use correlation::{correlate, pearson, Correlation};
pub use report::{render_table, summarize, write_csv, StatisticsSummary};
