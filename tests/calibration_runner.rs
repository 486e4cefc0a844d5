use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use synthetic_students::analysis::run_statistics;
use synthetic_students::calibration::{
    run_calibration, CalibrationError, CalibrationObserver, CalibrationPlan, ProgressEvent,
    SkipReason, SkippedCell,
};
use synthetic_students::gateway::{ChatGateway, ChatRequest, ChatResponse, ProviderError};
use synthetic_students::items::{Item, OptionKey};
use synthetic_students::personas::{persona_set, Persona};
use synthetic_students::store::{MemoryStore, RunStatus, StoreError};

const MODEL: &str = "anthropic/claude-3-haiku";

type Reply = dyn Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync;

/// Answers from a script keyed on (item stem, persona id).
struct ScriptedGateway {
    personas: HashMap<String, String>,
    reply: Box<Reply>,
    latency: Box<dyn Fn(&str) -> Duration + Send + Sync>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    fn new(
        personas: &[Persona],
        reply: impl Fn(&str, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            personas: personas
                .iter()
                .map(|p| (p.system_prompt.clone(), p.id.clone()))
                .collect(),
            reply: Box::new(reply),
            latency: Box::new(|_| Duration::ZERO),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn with_latency(mut self, latency: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Box::new(latency);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let persona = self
            .personas
            .get(req.system_prompt().unwrap_or_default())
            .cloned()
            .unwrap_or_default();
        let stem = req
            .user_prompt()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        self.seen.lock().unwrap().push((stem.clone(), persona.clone()));

        let delay = (self.latency)(&stem);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let text = (self.reply)(&stem, &persona)?;
        Ok(ChatResponse::priced(req.model.model_id(), text, 100, 10))
    }
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<ProgressEvent>>,
    skips: Mutex<Vec<SkippedCell>>,
    cancel_after: Option<(u64, Arc<AtomicBool>)>,
}

impl CalibrationObserver for Recorder {
    fn on_progress(&self, event: &ProgressEvent) {
        self.progress.lock().unwrap().push(event.clone());
        if let Some((after, flag)) = &self.cancel_after {
            if event.attempted >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn on_skip(&self, cell: &SkippedCell) {
        self.skips.lock().unwrap().push(cell.clone());
    }
}

fn items() -> Vec<Item> {
    vec![
        Item::new("q1", "Q1 stem", ["3", "4", "5", "6"], OptionKey::B),
        Item::new("q2", "Q2 stem", ["x", "y", "z", ""], OptionKey::A),
    ]
}

fn personas() -> Vec<Persona> {
    persona_set("minimal").unwrap().personas
}

fn plan() -> CalibrationPlan {
    CalibrationPlan::new(items(), personas(), MODEL).delay(Duration::ZERO)
}

#[tokio::test]
async fn sweep_records_every_parsed_answer_in_cell_order() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, persona| {
        Ok(match persona {
            "expert" => "The answer is B".to_string(),
            _ => "A) is the correct answer".to_string(),
        })
    });

    let summary = run_calibration(&gateway, &store, &plan().trials(2), None, None)
        .await
        .unwrap();

    assert_eq!(summary.responses, 12);
    assert_eq!(summary.max_responses, 12);
    assert_eq!(summary.skipped(), 0);
    assert!(!summary.cancelled);
    assert_eq!(summary.run_id.len(), 12);
    assert_eq!(gateway.calls(), 12);

    let responses = store.responses();
    let order: Vec<(&str, &str, u32)> = responses
        .iter()
        .map(|r| (r.item_id.as_str(), r.persona_id.as_str(), r.trial))
        .collect();
    assert_eq!(
        order,
        vec![
            ("q1", "expert", 1),
            ("q1", "expert", 2),
            ("q1", "developing", 1),
            ("q1", "developing", 2),
            ("q1", "novice", 1),
            ("q1", "novice", 2),
            ("q2", "expert", 1),
            ("q2", "expert", 2),
            ("q2", "developing", 1),
            ("q2", "developing", 2),
            ("q2", "novice", 1),
            ("q2", "novice", 2),
        ]
    );
    // Expert picks B: right on q1, wrong on q2. Everyone else picks A.
    assert!(responses[0].is_correct);
    assert!(!responses[2].is_correct);
    assert!(!responses[6].is_correct);
    assert!(responses[8].is_correct);
    assert_eq!(responses[0].rationale, "The answer is B");
    assert_eq!(responses[0].input_tokens, 100);

    let per_call = synthetic_students::gateway::chat_cost(MODEL, 100, 10);
    assert_eq!(summary.total_cost_nanodollars, per_call * 12);

    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, summary.run_id);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].total_responses, Some(12));
    assert_eq!(runs[0].persona_ids, vec!["expert", "developing", "novice"]);
    assert_eq!(runs[0].n_trials, 2);
}

#[tokio::test]
async fn parse_and_adapter_failures_are_skipped_and_reported() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |stem, persona| {
        if stem == "Q2 stem" && persona == "developing" {
            return Err(ProviderError::provider("openrouter", "upstream down", true));
        }
        Ok(match persona {
            "novice" => "honestly no idea".to_string(),
            _ => "B".to_string(),
        })
    });
    let recorder = Recorder::default();

    let summary = run_calibration(&gateway, &store, &plan(), Some(&recorder), None)
        .await
        .unwrap();

    // 6 cells: 2 novice parse failures, 1 adapter failure.
    assert_eq!(summary.responses, 3);
    assert_eq!(summary.skipped_parse, 2);
    assert_eq!(summary.skipped_adapter, 1);
    assert_eq!(summary.skipped_storage, 0);
    assert_eq!(gateway.calls(), 6, "failed cells are not retried by the sweep");

    let skips = recorder.skips.lock().unwrap().clone();
    assert_eq!(skips.len(), 3);
    assert_eq!(skips[0].item_id, "q1");
    assert_eq!(skips[0].persona_id, "novice");
    assert_eq!(skips[0].reason, SkipReason::ParseFailure);
    assert_eq!(
        skips[1].reason,
        SkipReason::AdapterError {
            code: "provider_error".into()
        }
    );
    assert_eq!(skips[1].persona_id, "developing");

    let progress = recorder.progress.lock().unwrap().clone();
    assert_eq!(progress.len(), 6);
    assert_eq!(progress.last().unwrap().attempted, 6);
    assert_eq!(progress.last().unwrap().completed, 3);
    assert_eq!(progress.last().unwrap().total, 6);
    assert_eq!(progress[0].current_item, "q1");
    assert_eq!(progress[0].current_persona, "expert");

    assert_eq!(store.runs()[0].status, RunStatus::Completed);
    assert_eq!(store.runs()[0].total_responses, Some(3));
}

#[tokio::test]
async fn storage_failures_skip_the_cell_without_aborting() {
    let store = MemoryStore::with_items(items());
    store.reject_responses_for("q1");
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("A".to_string()));
    let recorder = Recorder::default();

    let summary = run_calibration(&gateway, &store, &plan(), Some(&recorder), None)
        .await
        .unwrap();

    assert_eq!(summary.responses, 3);
    assert_eq!(summary.skipped_storage, 3);
    assert!(store.responses().iter().all(|r| r.item_id == "q2"));
    assert!(matches!(
        recorder.skips.lock().unwrap()[0].reason,
        SkipReason::Storage { .. }
    ));
    assert_eq!(store.runs()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn run_creation_failure_is_fatal_before_any_call() {
    let store = MemoryStore::with_items(items());
    store.fail_create_run();
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("A".to_string()));

    let err = run_calibration(&gateway, &store, &plan(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Store(StoreError::Rejected(_))));
    assert_eq!(gateway.calls(), 0);
    assert!(store.responses().is_empty());
}

#[tokio::test]
async fn invalid_plan_is_rejected_before_the_run_exists() {
    let store = MemoryStore::new();
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("A".to_string()));

    let err = run_calibration(&gateway, &store, &plan().trials(0), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Config(_)));
    assert!(store.runs().is_empty());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn cancellation_stops_new_calls_and_still_finishes_the_run() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string()));
    let flag = Arc::new(AtomicBool::new(false));
    let recorder = Recorder {
        cancel_after: Some((1, flag.clone())),
        ..Default::default()
    };

    let summary = run_calibration(
        &gateway,
        &store,
        &plan(),
        Some(&recorder),
        Some(flag.as_ref()),
    )
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(gateway.calls(), 1);
    assert_eq!(summary.responses, 1);
    assert_eq!(summary.not_attempted, 5);
    assert_eq!(store.runs()[0].status, RunStatus::Completed);
    assert_eq!(store.runs()[0].total_responses, Some(1));
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string()));
    let flag = AtomicBool::new(true);

    let summary = run_calibration(&gateway, &store, &plan(), None, Some(&flag))
        .await
        .unwrap();

    assert_eq!(gateway.calls(), 0);
    assert_eq!(summary.responses, 0);
    assert_eq!(summary.not_attempted, 6);
    assert_eq!(store.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sweep_keeps_record_order() {
    let store = MemoryStore::with_items(items());
    // Earlier cells take longer so completions arrive out of order.
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string())).with_latency(
        |stem| match stem {
            "Q1 stem" => Duration::from_millis(30),
            _ => Duration::from_millis(5),
        },
    );

    let summary = run_calibration(
        &gateway,
        &store,
        &plan().trials(2).concurrency(4),
        None,
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.responses, 12);
    let order: Vec<(String, String, u32)> = store
        .responses()
        .into_iter()
        .map(|r| (r.item_id, r.persona_id, r.trial))
        .collect();
    let mut expected = Vec::new();
    for item in ["q1", "q2"] {
        for persona in ["expert", "developing", "novice"] {
            for trial in 1..=2 {
                expected.push((item.to_string(), persona.to_string(), trial));
            }
        }
    }
    assert_eq!(order, expected);
}

#[tokio::test(start_paused = true)]
async fn calls_are_paced_by_the_delay() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string()));
    let start = tokio::time::Instant::now();

    run_calibration(
        &gateway,
        &store,
        &plan().delay(Duration::from_millis(50)),
        None,
        None,
    )
    .await
    .unwrap();

    // Six calls, the first immediate.
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert_eq!(gateway.seen.lock().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn sequential_sweep_waits_after_slow_calls() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string()))
        .with_latency(|_| Duration::from_millis(200));
    let start = tokio::time::Instant::now();

    let summary = run_calibration(
        &gateway,
        &store,
        &plan().delay(Duration::from_millis(50)),
        None,
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.responses, 6);
    // Six 200ms calls with a 50ms gap between each pair.
    assert!(
        start.elapsed() >= Duration::from_millis(6 * 200 + 5 * 50),
        "elapsed {:?}",
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_sweep_spaces_call_starts() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| Ok("B".to_string()))
        .with_latency(|_| Duration::from_millis(200));
    let start = tokio::time::Instant::now();

    run_calibration(
        &gateway,
        &store,
        &plan().delay(Duration::from_millis(50)).concurrency(6),
        None,
        None,
    )
    .await
    .unwrap();

    // Last start at 250ms, finishing 200ms later; no per-call gap.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(450), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(6 * 200), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn total_outage_completes_with_no_responses() {
    let store = MemoryStore::with_items(items());
    let gateway = ScriptedGateway::new(&personas(), |_, _| {
        Err(ProviderError::provider("openrouter", "service unavailable", true))
    });
    let recorder = Recorder::default();

    let summary = run_calibration(&gateway, &store, &plan().trials(2), Some(&recorder), None)
        .await
        .unwrap();

    assert_eq!(summary.responses, 0);
    assert_eq!(summary.skipped_adapter, summary.max_responses);
    assert_eq!(summary.skipped_adapter, 12);
    assert_eq!(summary.total_cost_nanodollars, 0);
    assert!(!summary.cancelled);
    assert_eq!(recorder.skips.lock().unwrap().len(), 12);

    let run = &store.runs()[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_responses, Some(0));

    let stats = run_statistics(&store, &summary.run_id).await.unwrap();
    assert!(stats.is_empty());
}
