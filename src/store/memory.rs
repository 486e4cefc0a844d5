//! In-memory repository.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    CalibrationRepository, CalibrationRun, NewRun, ResponseFilter, ResponseRecord, RunTotals,
    StatisticsSource, StoreError,
};
use crate::items::Item;
use crate::statistics::ItemStatistics;

#[derive(Default)]
struct State {
    items: HashMap<String, Item>,
    runs: Vec<CalibrationRun>,
    responses: Vec<ResponseRecord>,
    statistics: Vec<(ItemStatistics, StatisticsSource)>,
    /// Response inserts for these items fail.
    reject_items: Vec<String>,
    fail_create_run: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for item in items {
                state.items.insert(item.id.clone(), item);
            }
        }
        store
    }

    /// Make `insert_response` fail for one item.
    pub fn reject_responses_for(&self, item_id: impl Into<String>) {
        self.lock().reject_items.push(item_id.into());
    }

    /// Make `create_run` fail.
    pub fn fail_create_run(&self) {
        self.lock().fail_create_run = true;
    }

    pub fn runs(&self) -> Vec<CalibrationRun> {
        self.lock().runs.clone()
    }

    pub fn responses(&self) -> Vec<ResponseRecord> {
        self.lock().responses.clone()
    }

    pub fn statistics(&self) -> Vec<(ItemStatistics, StatisticsSource)> {
        self.lock().statistics.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CalibrationRepository for MemoryStore {
    async fn create_run(&self, run: &NewRun) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_create_run {
            return Err(StoreError::Rejected("create_run disabled".into()));
        }
        if state.runs.iter().any(|r| r.id == run.id) {
            return Err(StoreError::Rejected(format!("duplicate run {}", run.id)));
        }
        state.runs.push(CalibrationRun::from_new(run.clone()));
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, totals: &RunTotals) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))?;
        run.finish(totals);
        Ok(())
    }

    async fn insert_response(&self, record: &ResponseRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.reject_items.contains(&record.item_id) {
            return Err(StoreError::Rejected(format!("item {}", record.item_id)));
        }
        state.responses.push(record.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.lock().items.get(item_id).cloned())
    }

    async fn get_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<Vec<ResponseRecord>, StoreError> {
        Ok(self
            .lock()
            .responses
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn insert_statistics(
        &self,
        stats: &ItemStatistics,
        source: &StatisticsSource,
    ) -> Result<(), StoreError> {
        self.lock()
            .statistics
            .push((stats.clone(), source.clone()));
        Ok(())
    }
}
