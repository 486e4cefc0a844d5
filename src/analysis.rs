//! Statistics over stored responses.
//!
//! Glue between the repositories and the pure functions in
//! [`statistics`](crate::statistics): load responses, resolve answer keys,
//! compute, and optionally persist.

use std::collections::HashMap;

use crate::items::OptionKey;
use crate::statistics::{compute_run_statistics, ItemStatistics, ScoredResponse};
use crate::store::{
    CalibrationRepository, ResponseFilter, SqliteStore, StatisticsSource, StoreError,
};

/// Answer keys for every item id in `responses` that the repository knows.
pub async fn answer_keys(
    repo: &dyn CalibrationRepository,
    responses: &[ScoredResponse],
) -> Result<HashMap<String, OptionKey>, StoreError> {
    let mut keys = HashMap::new();
    for r in responses {
        if keys.contains_key(&r.item_id) {
            continue;
        }
        match repo.get_item(&r.item_id).await? {
            Some(item) => {
                keys.insert(r.item_id.clone(), item.correct);
            }
            None => {
                tracing::debug!(item_id = %r.item_id, "Responses reference an unknown item");
            }
        }
    }
    Ok(keys)
}

/// Per-item statistics for one synthetic run.
pub async fn run_statistics(
    repo: &dyn CalibrationRepository,
    run_id: &str,
) -> Result<Vec<ItemStatistics>, StoreError> {
    let scored: Vec<ScoredResponse> = repo
        .get_responses(&ResponseFilter::run(run_id))
        .await?
        .iter()
        .map(|r| r.scored())
        .collect();
    let keys = answer_keys(repo, &scored).await?;
    Ok(compute_run_statistics(&scored, &keys))
}

/// Per-item statistics over every stored human response, with the number of
/// responses they were computed from.
pub async fn human_statistics(
    store: &SqliteStore,
) -> Result<(Vec<ItemStatistics>, usize), StoreError> {
    let scored: Vec<ScoredResponse> = store
        .get_human_responses(None)
        .await?
        .iter()
        .enumerate()
        .map(|(row, r)| r.scored(row))
        .collect();
    let keys = answer_keys(store, &scored).await?;
    Ok((compute_run_statistics(&scored, &keys), scored.len()))
}

pub async fn save_statistics(
    repo: &dyn CalibrationRepository,
    stats: &[ItemStatistics],
    source: &StatisticsSource,
) -> Result<(), StoreError> {
    for s in stats {
        repo.insert_statistics(s, source).await?;
    }
    Ok(())
}
