#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use synthetic_students::analysis::{human_statistics, run_statistics, save_statistics};
use synthetic_students::calibration::{
    run_calibration, CalibrationObserver, CalibrationPlan, JsonlTraceSink, ProgressEvent,
    SkippedCell,
};
use synthetic_students::config::Settings;
use synthetic_students::gateway::{
    available_models, GatewayConfig, ProviderGateway, TracingUsageSink, DEFAULT_AVG_OUTPUT_TOKENS,
};
use synthetic_students::items::{parse_item_file, ItemFilter};
use synthetic_students::personas::{list_persona_sets, persona_set, PersonaSet};
use synthetic_students::statistics::{correlate, render_table, summarize, write_csv};
use synthetic_students::store::{
    HumanResponse, ResponseRecord, SqliteStore, StatisticsSource, ValidationRecord,
};

#[derive(Parser)]
#[command(
    name = "synthetic-students",
    version,
    about = "Calibrate multiple-choice items with simulated students"
)]
struct Cli {
    /// SQLite database (default: $SYNTHETIC_STUDENTS_DB or ./data/synthetic-students.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Debug-level logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Import items from a JSON file
    Import {
        #[arg(long)]
        file: PathBuf,
        /// Source tag stored with every imported item
        #[arg(long, default_value = "import")]
        source: String,
    },
    /// Import human responses from a JSON array
    ImportHuman {
        #[arg(long)]
        file: PathBuf,
    },
    /// List items, persona sets or runs
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Run a calibration sweep (LLM calls unless --estimate)
    Calibrate {
        /// Preset persona set
        #[arg(long, default_value = "standard-ability", conflicts_with = "personas_file")]
        personas: String,
        /// Custom persona set as JSON
        #[arg(long)]
        personas_file: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        trials: u32,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        name: Option<String>,
        /// Print the cost estimate and exit without calling the model
        #[arg(long)]
        estimate: bool,
        /// Write a JSONL trace of every cell
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Compute item statistics for a run or for human responses
    Stats {
        #[arg(long, required_unless_present = "human", conflicts_with = "human")]
        run: Option<String>,
        #[arg(long)]
        human: bool,
        #[arg(long)]
        json: bool,
        /// Also write the statistics as CSV
        #[arg(long)]
        out: Option<PathBuf>,
        /// Do not store the computed statistics
        #[arg(long)]
        no_save: bool,
    },
    /// Correlate a run's statistics with human data or another run
    Compare {
        #[arg(long)]
        run: String,
        /// Reference run; human responses when omitted
        #[arg(long)]
        against: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List priced models
    Models,
}

#[derive(Subcommand)]
enum ListCommands {
    Items {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    Personas {
        /// Show the personas of one set
        #[arg(long)]
        set: Option<String>,
    },
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Progress on stderr plus an optional JSONL trace.
struct CliObserver {
    trace: Option<JsonlTraceSink>,
}

impl CalibrationObserver for CliObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        eprint!(
            "\r[{}/{}] {} responses ({} / {})    ",
            event.attempted, event.total, event.completed, event.current_item, event.current_persona
        );
        if event.attempted == event.total {
            eprintln!();
        }
    }

    fn on_response(&self, record: &ResponseRecord) {
        if let Some(trace) = &self.trace {
            trace.on_response(record);
        }
    }

    fn on_skip(&self, cell: &SkippedCell) {
        if let Some(trace) = &self.trace {
            trace.on_skip(cell);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_env()?;
    let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path.clone());

    match cli.command {
        Commands::Init => {
            SqliteStore::new(&db_path)?;
            println!("initialized {}", db_path.display());
        }
        Commands::Import { file, source } => {
            let raw = std::fs::read_to_string(&file)?;
            let report = parse_item_file(&raw, &source)?;
            for (index, err) in &report.invalid {
                eprintln!("skipping entry {index}: {err}");
            }
            let store = SqliteStore::new(&db_path)?;
            let imported = store.import_items(report.items).await?;
            println!(
                "imported {imported} items ({} non-MCQ skipped, {} invalid)",
                report.skipped_non_mcq,
                report.invalid.len()
            );
        }
        Commands::ImportHuman { file } => {
            let rows: Vec<HumanResponse> = read_json(&file)?;
            let store = SqliteStore::new(&db_path)?;
            let imported = store.insert_human_responses(rows).await?;
            println!("imported {imported} human responses");
        }
        Commands::List { command } => match command {
            ListCommands::Items {
                source,
                topic,
                limit,
            } => {
                let store = SqliteStore::new(&db_path)?;
                let filter = ItemFilter {
                    source,
                    topic,
                    limit: Some(limit),
                };
                let total = store.count_items(&filter).await?;
                let items = store.list_items(&filter).await?;
                for item in &items {
                    println!(
                        "{}\t{}\t{}\t{}",
                        item.id,
                        item.source.as_deref().unwrap_or("-"),
                        item.correct,
                        truncate(&item.stem, 60)
                    );
                }
                println!("{} of {total} items", items.len());
            }
            ListCommands::Personas { set } => match set {
                Some(id) => {
                    let set = persona_set(&id)?;
                    println!("{} ({})", set.name, set.id);
                    for p in &set.personas {
                        println!(
                            "  {:<12} theta={:<7} T={:.1}  {}",
                            p.id,
                            p.theta,
                            p.temperature,
                            p.description.as_deref().unwrap_or("")
                        );
                    }
                }
                None => {
                    for (id, name, n) in list_persona_sets() {
                        println!("{id:<18} {n} personas  {name}");
                    }
                }
            },
            ListCommands::Runs { limit } => {
                let store = SqliteStore::new(&db_path)?;
                for run in store.list_runs(limit).await? {
                    println!(
                        "{}\t{}\t{}\t{}/{}\t${:.4}\t{}",
                        run.id,
                        run.status.as_str(),
                        run.model,
                        run.total_responses.unwrap_or(0),
                        run.max_responses(),
                        run.total_cost_usd.unwrap_or(0.0),
                        run.started_at.to_rfc3339()
                    );
                }
            }
        },
        Commands::Calibrate {
            personas,
            personas_file,
            trials,
            model,
            source,
            topic,
            limit,
            concurrency,
            delay_ms,
            name,
            estimate,
            trace,
        } => {
            let set: PersonaSet = match personas_file {
                Some(path) => PersonaSet::from_json(&std::fs::read_to_string(path)?)?,
                None => persona_set(&personas)?,
            };
            let store = SqliteStore::new(&db_path)?;
            let filter = ItemFilter {
                source,
                topic,
                limit,
            };
            let items = store.list_items(&filter).await?;
            if items.is_empty() {
                return Err("no items match the selection; run `import` first".into());
            }

            let mut plan = CalibrationPlan::new(
                items,
                set.personas,
                model.unwrap_or_else(|| settings.model.clone()),
            )
            .trials(trials)
            .delay(delay_ms.map(Duration::from_millis).unwrap_or(settings.delay))
            .concurrency(concurrency.unwrap_or(settings.concurrency))
            .item_filter(filter.describe());
            if let Some(name) = name {
                plan = plan.name(name);
            }
            plan.validate()?;

            let est = plan.estimate_from_prompts(DEFAULT_AVG_OUTPUT_TOKENS);
            println!(
                "{} items x {} personas x {} trials = {} calls on {}",
                plan.items.len(),
                plan.personas.len(),
                plan.trials,
                est.calls,
                plan.model
            );
            println!(
                "estimated cost: ${:.4} - ${:.4} (avg {} input / {} output tokens per call)",
                est.min_usd, est.max_usd, est.avg_input_tokens, est.avg_output_tokens
            );
            if estimate {
                return Ok(());
            }

            let gateway = ProviderGateway::openrouter(
                settings.openrouter()?,
                Arc::new(TracingUsageSink),
                GatewayConfig::default(),
            )?;

            let (trace_sink, trace_worker) = if let Some(path) = trace {
                let (sink, worker) = JsonlTraceSink::new(path)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let observer = CliObserver { trace: trace_sink };

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("\ninterrupt: finishing in-flight calls");
                        cancel.store(true, Ordering::Relaxed);
                    }
                });
            }

            let summary = run_calibration(
                &gateway,
                &store,
                &plan,
                Some(&observer as &dyn CalibrationObserver),
                Some(cancel.as_ref()),
            )
            .await?;

            drop(observer);
            if let Some(worker) = trace_worker {
                worker.join()?;
            }

            println!("{summary}");
            println!(
                "skipped: {} unparseable, {} generation errors, {} storage errors",
                summary.skipped_parse, summary.skipped_adapter, summary.skipped_storage
            );
            println!("next: synthetic-students stats --run {}", summary.run_id);
        }
        Commands::Stats {
            run,
            human,
            json,
            out,
            no_save,
        } => {
            let store = SqliteStore::new(&db_path)?;
            let (stats, source) = match run {
                Some(run_id) if !human => {
                    store.get_run(&run_id).await?;
                    let stats = run_statistics(&store, &run_id).await?;
                    (stats, StatisticsSource::Synthetic { run_id })
                }
                _ => (human_statistics(&store).await?.0, StatisticsSource::Human),
            };
            if stats.is_empty() {
                return Err("no responses to analyse".into());
            }
            if !no_save {
                save_statistics(&store, &stats, &source).await?;
            }
            if let Some(path) = out {
                let file = BufWriter::new(File::create(path)?);
                write_csv(file, &stats)?;
            }

            let summary = summarize(&stats);
            if json {
                let value = serde_json::json!({ "summary": summary, "items": stats });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", render_table(&stats));
                println!();
                println!(
                    "{} items, mean difficulty {:.3}, mean discrimination {:.3}, mean quality {:.2}",
                    summary.n_items,
                    summary.mean_difficulty,
                    summary.mean_discrimination,
                    summary.mean_quality
                );
                println!(
                    "{} flagged ({:.1}%)",
                    summary.flagged_items,
                    summary.flagged_percent()
                );
                for (flag, count) in &summary.flag_counts {
                    println!("  {flag:<24} {count}");
                }
            }
        }
        Commands::Compare { run, against, json } => {
            let store = SqliteStore::new(&db_path)?;
            store.get_run(&run).await?;
            let synthetic = run_statistics(&store, &run).await?;
            let (reference, n_reference) = match &against {
                Some(other) => {
                    store.get_run(other).await?;
                    let stats = run_statistics(&store, other).await?;
                    let n = stats.iter().map(|s| s.n_responses).sum();
                    (stats, n)
                }
                None => human_statistics(&store).await?,
            };

            let corr = correlate(&synthetic, &reference);
            store
                .insert_validation(&ValidationRecord {
                    run_id: run.clone(),
                    n_items_compared: corr.n_items,
                    n_human_responses: n_reference,
                    difficulty_correlation: corr.difficulty_correlation,
                    discrimination_correlation: corr.discrimination_correlation,
                    difficulty_mae: corr.difficulty_mae,
                    difficulty_bias: corr.difficulty_bias,
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&corr)?);
            } else {
                let label = against.as_deref().unwrap_or("human");
                let shared: HashSet<&str> =
                    synthetic.iter().map(|s| s.item_id.as_str()).collect();
                println!(
                    "{run} vs {label}: {} shared items ({} in run)",
                    corr.n_items,
                    shared.len()
                );
                println!(
                    "difficulty r={:.3} rho={:.3} mae={:.3} bias={:+.3}",
                    corr.difficulty_correlation,
                    corr.difficulty_rank_correlation,
                    corr.difficulty_mae,
                    corr.difficulty_bias
                );
                println!(
                    "discrimination r={:.3} mae={:.3}",
                    corr.discrimination_correlation, corr.discrimination_mae
                );
            }
        }
        Commands::Models => {
            println!("{:<32} {:>10} {:>10}", "model", "in/1M", "out/1M");
            for m in available_models() {
                println!(
                    "{:<32} {:>10} {:>10}",
                    m.id,
                    format!("${:.2}", m.input_per_1m),
                    format!("${:.2}", m.output_per_1m)
                );
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
