//! The calibration sweep.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::events::{CalibrationObserver, ProgressEvent, SkipReason, SkippedCell};
use super::pacing::Pacer;
use super::{CalibrationError, CalibrationPlan, CalibrationSummary, MAX_OUTPUT_TOKENS};
use crate::answer::parse_answer;
use crate::gateway::{
    nanos_to_usd, Attribution, ChatGateway, ChatModel, ChatRequest, ChatResponse, Message,
    ProviderError,
};
use crate::items::Item;
use crate::personas::Persona;
use crate::store::{CalibrationRepository, NewRun, ResponseRecord, RunTotals};

#[derive(Debug, Clone, Copy)]
struct Cell {
    item: usize,
    persona: usize,
    trial: u32,
}

enum CellOutcome {
    Answered(Result<ChatResponse, ProviderError>),
    NotAttempted,
}

/// Item-major, then persona, then trial (from 1).
fn cells(plan: &CalibrationPlan) -> Vec<Cell> {
    let mut out = Vec::with_capacity(plan.total_cells() as usize);
    for item in 0..plan.items.len() {
        for persona in 0..plan.personas.len() {
            for trial in 1..=plan.trials {
                out.push(Cell {
                    item,
                    persona,
                    trial,
                });
            }
        }
    }
    out
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn cell_request(model: &str, item: &Item, persona: &Persona, run_id: &str) -> ChatRequest {
    ChatRequest::new(
        ChatModel::openrouter(model),
        vec![
            Message::system(persona.system_prompt.clone()),
            Message::user(item.render_prompt()),
        ],
        Attribution::new("calibration::cell").with_run(run_id),
    )
    .temperature(persona.temperature)
    .max_tokens(MAX_OUTPUT_TOKENS)
}

/// Sweep `plan` against `gateway`, persisting through `repo`.
///
/// The run row is created before any call; failing to create it is the only
/// fatal error once the plan validates. Cells whose call or parse fails are
/// skipped and reported to `observer`. Records are handled in cell order even
/// with `concurrency > 1`. Setting `cancel` stops new calls; the run is still
/// finalized with what was gathered.
pub async fn run_calibration(
    gateway: &dyn ChatGateway,
    repo: &dyn CalibrationRepository,
    plan: &CalibrationPlan,
    observer: Option<&dyn CalibrationObserver>,
    cancel: Option<&AtomicBool>,
) -> Result<CalibrationSummary, CalibrationError> {
    plan.validate()?;

    let started = Instant::now();
    let run_id = new_run_id();
    let persona_ids: Vec<String> = plan.personas.iter().map(|p| p.id.clone()).collect();

    repo.create_run(&NewRun {
        id: run_id.clone(),
        name: plan.name.clone(),
        description: plan.description.clone(),
        model: plan.model.clone(),
        persona_ids,
        item_filter: plan.item_filter.clone(),
        n_items: plan.items.len(),
        n_personas: plan.personas.len(),
        n_trials: plan.trials,
        started_at: Utc::now(),
    })
    .await?;

    let total = plan.total_cells();
    info!(
        run_id = %run_id,
        model = %plan.model,
        items = plan.items.len(),
        personas = plan.personas.len(),
        trials = plan.trials,
        total,
        concurrency = plan.concurrency,
        "Calibration run started"
    );

    let pacer = Pacer::for_concurrency(plan.delay, plan.concurrency);
    let is_cancelled = || cancel.is_some_and(|flag| flag.load(AtomicOrdering::Relaxed));

    let mut outcomes = stream::iter(cells(plan))
        .map(|cell| {
            let pacer = &pacer;
            let run_id = run_id.as_str();
            let is_cancelled = &is_cancelled;
            async move {
                if is_cancelled() {
                    return (cell, CellOutcome::NotAttempted);
                }
                pacer.acquire().await;
                if is_cancelled() {
                    return (cell, CellOutcome::NotAttempted);
                }
                let req = cell_request(
                    &plan.model,
                    &plan.items[cell.item],
                    &plan.personas[cell.persona],
                    run_id,
                );
                let result = gateway.chat(req).await;
                pacer.release().await;
                (cell, CellOutcome::Answered(result))
            }
        })
        .buffered(plan.concurrency);

    let mut summary = CalibrationSummary {
        run_id: run_id.clone(),
        responses: 0,
        max_responses: total,
        skipped_parse: 0,
        skipped_adapter: 0,
        skipped_storage: 0,
        not_attempted: 0,
        total_cost_nanodollars: 0,
        duration: Default::default(),
        cancelled: false,
    };
    let mut attempted: u64 = 0;

    while let Some((cell, outcome)) = outcomes.next().await {
        let item = &plan.items[cell.item];
        let persona = &plan.personas[cell.persona];

        let result = match outcome {
            CellOutcome::Answered(result) => result,
            CellOutcome::NotAttempted => {
                summary.cancelled = true;
                summary.not_attempted += 1;
                continue;
            }
        };
        attempted += 1;

        let skip = match result {
            Ok(resp) => match parse_answer(&resp.content) {
                Some(selected) => {
                    let record = ResponseRecord {
                        run_id: run_id.clone(),
                        item_id: item.id.clone(),
                        persona_id: persona.id.clone(),
                        trial: cell.trial,
                        selected,
                        is_correct: selected == item.correct,
                        rationale: resp.content,
                        latency_ms: resp.latency.as_millis() as u64,
                        input_tokens: resp.input_tokens,
                        output_tokens: resp.output_tokens,
                        model: plan.model.clone(),
                    };
                    match repo.insert_response(&record).await {
                        Ok(()) => {
                            summary.responses += 1;
                            summary.total_cost_nanodollars = summary
                                .total_cost_nanodollars
                                .saturating_add(resp.cost_nanodollars);
                            if let Some(obs) = observer {
                                obs.on_response(&record);
                            }
                            None
                        }
                        Err(e) => {
                            warn!(
                                run_id = %run_id,
                                item_id = %item.id,
                                persona_id = %persona.id,
                                trial = cell.trial,
                                error = %e,
                                "Failed to store response"
                            );
                            summary.skipped_storage += 1;
                            Some(SkipReason::Storage {
                                message: e.to_string(),
                            })
                        }
                    }
                }
                None => {
                    debug!(
                        item_id = %item.id,
                        persona_id = %persona.id,
                        trial = cell.trial,
                        reply_len = resp.content.len(),
                        "No answer letter in reply"
                    );
                    summary.skipped_parse += 1;
                    Some(SkipReason::ParseFailure)
                }
            },
            Err(e) => {
                debug!(
                    item_id = %item.id,
                    persona_id = %persona.id,
                    trial = cell.trial,
                    code = e.code(),
                    error = %e,
                    "Generation failed"
                );
                summary.skipped_adapter += 1;
                Some(SkipReason::AdapterError {
                    code: e.code().to_string(),
                })
            }
        };

        if let Some(obs) = observer {
            if let Some(reason) = skip {
                obs.on_skip(&SkippedCell {
                    item_id: item.id.clone(),
                    persona_id: persona.id.clone(),
                    trial: cell.trial,
                    reason,
                });
            }
            obs.on_progress(&ProgressEvent {
                completed: summary.responses,
                attempted,
                total,
                current_item: item.id.clone(),
                current_persona: persona.id.clone(),
            });
        }
    }

    repo.finish_run(
        &run_id,
        &RunTotals {
            total_responses: summary.responses,
            total_cost_usd: nanos_to_usd(summary.total_cost_nanodollars),
            completed_at: Utc::now(),
        },
    )
    .await?;

    summary.duration = started.elapsed();
    info!(
        run_id = %run_id,
        responses = summary.responses,
        max_responses = total,
        skipped = summary.skipped(),
        cancelled = summary.cancelled,
        cost_usd = summary.total_cost_usd(),
        duration_ms = summary.duration.as_millis() as u64,
        "Calibration run completed"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::OptionKey;
    use crate::personas::ability_personas;

    #[test]
    fn cells_are_item_major_and_trials_start_at_one() {
        let plan = CalibrationPlan::new(
            vec![
                Item::new("q1", "x", ["a", "b", "", ""], OptionKey::A),
                Item::new("q2", "y", ["a", "b", "", ""], OptionKey::B),
            ],
            ability_personas()[..2].to_vec(),
            "m",
        )
        .trials(2);
        let order: Vec<(usize, usize, u32)> = cells(&plan)
            .iter()
            .map(|c| (c.item, c.persona, c.trial))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, 0, 1),
                (0, 0, 2),
                (0, 1, 1),
                (0, 1, 2),
                (1, 0, 1),
                (1, 0, 2),
                (1, 1, 1),
                (1, 1, 2),
            ]
        );
    }

    #[test]
    fn run_ids_are_twelve_hex_chars() {
        let id = new_run_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_run_id());
    }

    #[test]
    fn request_carries_persona_settings() {
        let persona = &ability_personas()[0];
        let item = Item::new("q1", "2+2?", ["3", "4", "5", "6"], OptionKey::B);
        let req = cell_request("anthropic/claude-3-haiku", &item, persona, "run1");
        assert_eq!(req.system_prompt(), Some(persona.system_prompt.as_str()));
        assert_eq!(req.user_prompt(), Some(item.render_prompt().as_str()));
        assert_eq!(req.temperature, persona.temperature);
        assert_eq!(req.max_tokens, Some(500));
        assert_eq!(req.attribution.run_id.as_deref(), Some("run1"));
    }
}
