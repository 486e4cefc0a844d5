//! SQLite-backed store for items, calibration runs, responses and statistics.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Semaphore;

use super::{
    CalibrationRepository, CalibrationRun, HumanResponse, NewRun, ResponseFilter, ResponseRecord,
    RunStatus, RunTotals, StatisticsSource, StoreError, ValidationRecord,
};
use crate::items::{Item, ItemFilter, OptionKey};
use crate::statistics::{ItemFlag, ItemStatistics, OptionRates};

pub const DEFAULT_DB_PATH: &str = "./data/synthetic-students.db";

const ITEM_COLUMNS: &str = "id, source, topic, difficulty_label, stem, option_a, option_b, \
     option_c, option_d, correct, explanation, code";

const RUN_COLUMNS: &str = "id, name, description, model, persona_ids, item_filter, n_items, \
     n_personas, n_trials, status, total_responses, total_cost_usd, started_at, completed_at";

const RESPONSE_COLUMNS: &str = "run_id, item_id, persona_id, trial, selected, is_correct, \
     reasoning, latency_ms, input_tokens, output_tokens, model";

const STATISTICS_COLUMNS: &str = "item_id, n_responses, difficulty_index, point_biserial, \
     option_a_rate, option_b_rate, option_c_rate, option_d_rate, functional_distractors, \
     nonfunctional_distractors, response_variance, flags, quality_score";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    /// One blocking task waits on the connection at a time.
    sem: Arc<Semaphore>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sem: Arc::new(Semaphore::new(1)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("SYNTHETIC_STUDENTS_DB") {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_DB_PATH)
    }

    /// The connection stays usable after a panic elsewhere, so poisoning is
    /// ignored.
    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError>,
    {
        let mut guard = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        let _permit = self.sem.acquire().await.map_err(|_| StoreError::Closed)?;
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                source TEXT,
                topic TEXT,
                difficulty_label TEXT,
                stem TEXT NOT NULL,
                option_a TEXT NOT NULL DEFAULT '',
                option_b TEXT NOT NULL DEFAULT '',
                option_c TEXT NOT NULL DEFAULT '',
                option_d TEXT NOT NULL DEFAULT '',
                correct TEXT NOT NULL CHECK (correct IN ('A', 'B', 'C', 'D')),
                explanation TEXT,
                code TEXT,
                imported_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_items_source ON items(source);

            CREATE TABLE IF NOT EXISTS calibration_runs (
                id TEXT PRIMARY KEY,
                name TEXT,
                description TEXT,
                model TEXT NOT NULL,
                persona_ids TEXT NOT NULL,
                item_filter TEXT,
                n_items INTEGER NOT NULL,
                n_personas INTEGER NOT NULL,
                n_trials INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'running',
                total_responses INTEGER,
                total_cost_usd REAL,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS synthetic_responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES calibration_runs(id),
                item_id TEXT NOT NULL,
                persona_id TEXT NOT NULL,
                trial INTEGER NOT NULL DEFAULT 1,
                selected TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                reasoning TEXT,
                latency_ms INTEGER,
                input_tokens INTEGER,
                output_tokens INTEGER,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (run_id, item_id, persona_id, trial)
            );
            CREATE INDEX IF NOT EXISTS idx_responses_run ON synthetic_responses(run_id);
            CREATE INDEX IF NOT EXISTS idx_responses_item ON synthetic_responses(item_id);

            CREATE TABLE IF NOT EXISTS human_responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL,
                user_id TEXT,
                selected TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                latency_ms INTEGER,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_human_item ON human_responses(item_id);

            CREATE TABLE IF NOT EXISTS item_statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL,
                source_type TEXT NOT NULL,
                run_id TEXT,
                n_responses INTEGER NOT NULL,
                difficulty_index REAL NOT NULL,
                point_biserial REAL NOT NULL,
                option_a_rate REAL NOT NULL,
                option_b_rate REAL NOT NULL,
                option_c_rate REAL NOT NULL,
                option_d_rate REAL NOT NULL,
                functional_distractors INTEGER NOT NULL,
                nonfunctional_distractors INTEGER NOT NULL,
                response_variance REAL NOT NULL,
                flags TEXT NOT NULL,
                quality_score REAL NOT NULL,
                computed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_statistics_run ON item_statistics(run_id);

            CREATE TABLE IF NOT EXISTS validation_comparisons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                n_items_compared INTEGER NOT NULL,
                n_human_responses INTEGER NOT NULL,
                difficulty_correlation REAL NOT NULL,
                discrimination_correlation REAL NOT NULL,
                difficulty_mae REAL NOT NULL,
                difficulty_bias REAL NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Insert or replace items in one transaction. Returns the number written.
    pub async fn import_items(&self, items: Vec<Item>) -> Result<usize, StoreError> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO items (id, source, topic, difficulty_label, stem, \
                     option_a, option_b, option_c, option_d, correct, explanation, code, imported_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for item in &items {
                    stmt.execute(params![
                        item.id,
                        item.source,
                        item.topic,
                        item.difficulty_label,
                        item.stem,
                        item.options[0],
                        item.options[1],
                        item.options[2],
                        item.options[3],
                        item.correct.as_str(),
                        item.explanation,
                        item.code,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(items.len())
        })
        .await
    }

    /// Items matching `filter`, in import order.
    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, args) = item_where(&filter);
            let limit = filter.limit.map(|n| n as i64).unwrap_or(-1);
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items {clause} ORDER BY rowid LIMIT {limit}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(args.iter()))?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(row_to_item(row)?);
            }
            Ok(items)
        })
        .await
    }

    /// Count of items matching `filter`, ignoring its limit.
    pub async fn count_items(&self, filter: &ItemFilter) -> Result<usize, StoreError> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let (clause, args) = item_where(&filter);
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM items {clause}"),
                rusqlite::params_from_iter(args.iter()),
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Runs
    // -------------------------------------------------------------------------

    pub async fn get_run(&self, run_id: &str) -> Result<CalibrationRun, StoreError> {
        let run_id = run_id.to_string();
        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM calibration_runs WHERE id = ?1"))?;
            let mut rows = stmt.query(params![run_id])?;
            match rows.next()? {
                Some(row) => row_to_run(row),
                None => Err(StoreError::NotFound(format!("run {run_id}"))),
            }
        })
        .await
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<CalibrationRun>, StoreError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM calibration_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut runs = Vec::new();
            while let Some(row) = rows.next()? {
                runs.push(row_to_run(row)?);
            }
            Ok(runs)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Human responses
    // -------------------------------------------------------------------------

    pub async fn insert_human_responses(
        &self,
        responses: Vec<HumanResponse>,
    ) -> Result<usize, StoreError> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO human_responses (item_id, user_id, selected, is_correct, \
                     latency_ms, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for r in &responses {
                    stmt.execute(params![
                        r.item_id,
                        r.user_id,
                        r.selected.as_str(),
                        r.is_correct,
                        r.latency_ms.map(|v| v as i64),
                        r.source,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(responses.len())
        })
        .await
    }

    /// Human responses, optionally restricted to some items, in insertion order.
    pub async fn get_human_responses(
        &self,
        item_ids: Option<Vec<String>>,
    ) -> Result<Vec<HumanResponse>, StoreError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, user_id, selected, is_correct, latency_ms, source \
                 FROM human_responses ORDER BY id",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let item_id: String = row.get(0)?;
                if let Some(ids) = &item_ids {
                    if !ids.contains(&item_id) {
                        continue;
                    }
                }
                out.push(HumanResponse {
                    item_id,
                    user_id: row.get(1)?,
                    selected: parse_key(&row.get::<_, String>(2)?)?,
                    is_correct: row.get(3)?,
                    latency_ms: row.get::<_, Option<i64>>(4)?.map(|v| v.max(0) as u64),
                    source: row.get(5)?,
                });
            }
            Ok(out)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Statistics and validation
    // -------------------------------------------------------------------------

    /// Stored statistics for a source, latest computation per item, in item
    /// order of first computation.
    pub async fn get_statistics(
        &self,
        source: &StatisticsSource,
    ) -> Result<Vec<ItemStatistics>, StoreError> {
        let source_type = source.source_type();
        let run_id = source.run_id().map(str::to_string);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STATISTICS_COLUMNS} FROM item_statistics \
                 WHERE source_type = ?1 AND run_id IS ?2 ORDER BY id"
            ))?;
            let mut rows = stmt.query(params![source_type, run_id])?;
            let mut out: Vec<ItemStatistics> = Vec::new();
            while let Some(row) = rows.next()? {
                let stats = row_to_statistics(row)?;
                match out.iter_mut().find(|s| s.item_id == stats.item_id) {
                    Some(existing) => *existing = stats,
                    None => out.push(stats),
                }
            }
            Ok(out)
        })
        .await
    }

    pub async fn insert_validation(&self, record: &ValidationRecord) -> Result<i64, StoreError> {
        let r = record.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO validation_comparisons (run_id, n_items_compared, n_human_responses, \
                 difficulty_correlation, discrimination_correlation, difficulty_mae, difficulty_bias, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    r.run_id,
                    r.n_items_compared as i64,
                    r.n_human_responses as i64,
                    r.difficulty_correlation,
                    r.discrimination_correlation,
                    r.difficulty_mae,
                    r.difficulty_bias,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }
}

#[async_trait]
impl CalibrationRepository for SqliteStore {
    async fn create_run(&self, run: &NewRun) -> Result<(), StoreError> {
        let run = run.clone();
        self.blocking(move |conn| {
            let persona_ids = serde_json::to_string(&run.persona_ids)
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            conn.execute(
                "INSERT INTO calibration_runs (id, name, description, model, persona_ids, \
                 item_filter, n_items, n_personas, n_trials, status, started_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run.id,
                    run.name,
                    run.description,
                    run.model,
                    persona_ids,
                    run.item_filter,
                    run.n_items as i64,
                    run.n_personas as i64,
                    run.n_trials,
                    RunStatus::Running.as_str(),
                    run.started_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn finish_run(&self, run_id: &str, totals: &RunTotals) -> Result<(), StoreError> {
        let run_id = run_id.to_string();
        let totals = totals.clone();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE calibration_runs SET total_responses = ?1, total_cost_usd = ?2, \
                 status = ?3, completed_at = ?4 WHERE id = ?5",
                params![
                    totals.total_responses as i64,
                    totals.total_cost_usd,
                    RunStatus::Completed.as_str(),
                    totals.completed_at.to_rfc3339(),
                    run_id,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("run {run_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn insert_response(&self, record: &ResponseRecord) -> Result<(), StoreError> {
        let r = record.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO synthetic_responses (run_id, item_id, persona_id, trial, selected, \
                 is_correct, reasoning, latency_ms, input_tokens, output_tokens, model, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    r.run_id,
                    r.item_id,
                    r.persona_id,
                    r.trial,
                    r.selected.as_str(),
                    r.is_correct,
                    r.rationale,
                    r.latency_ms as i64,
                    r.input_tokens,
                    r.output_tokens,
                    r.model,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        let item_id = item_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"))?;
            let mut rows = stmt.query(params![item_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_item(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<Vec<ResponseRecord>, StoreError> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESPONSE_COLUMNS} FROM synthetic_responses \
                 WHERE (?1 IS NULL OR run_id = ?1) \
                   AND (?2 IS NULL OR item_id = ?2) \
                   AND (?3 IS NULL OR persona_id = ?3) \
                 ORDER BY id"
            ))?;
            let mut rows = stmt.query(params![filter.run_id, filter.item_id, filter.persona_id])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_response(row)?);
            }
            Ok(out)
        })
        .await
    }

    async fn insert_statistics(
        &self,
        stats: &ItemStatistics,
        source: &StatisticsSource,
    ) -> Result<(), StoreError> {
        let s = stats.clone();
        let source = source.clone();
        self.blocking(move |conn| {
            let flags = serde_json::to_string(&s.flags).map_err(|e| StoreError::Decode(e.to_string()))?;
            conn.execute(
                "INSERT INTO item_statistics (item_id, source_type, run_id, n_responses, \
                 difficulty_index, point_biserial, option_a_rate, option_b_rate, option_c_rate, \
                 option_d_rate, functional_distractors, nonfunctional_distractors, response_variance, \
                 flags, quality_score, computed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    s.item_id,
                    source.source_type(),
                    source.run_id(),
                    s.n_responses as i64,
                    s.difficulty_index,
                    s.point_biserial,
                    s.option_rates.a,
                    s.option_rates.b,
                    s.option_rates.c,
                    s.option_rates.d,
                    s.functional_distractors,
                    s.nonfunctional_distractors,
                    s.response_variance,
                    flags,
                    s.quality_score,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn item_where(filter: &ItemFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(source) = &filter.source {
        args.push(source.clone());
        clauses.push(format!("source = ?{}", args.len()));
    }
    if let Some(topic) = &filter.topic {
        args.push(format!("%{topic}%"));
        clauses.push(format!("topic LIKE ?{}", args.len()));
    }
    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}

fn parse_key(s: &str) -> Result<OptionKey, StoreError> {
    s.parse::<OptionKey>()
        .map_err(|e| StoreError::Decode(e.to_string()))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("timestamp {s:?}: {e}")))
}

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<Item, StoreError> {
    Ok(Item {
        id: row.get(0)?,
        source: row.get(1)?,
        topic: row.get(2)?,
        difficulty_label: row.get(3)?,
        stem: row.get(4)?,
        options: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
        correct: parse_key(&row.get::<_, String>(9)?)?,
        explanation: row.get(10)?,
        code: row.get(11)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> Result<CalibrationRun, StoreError> {
    let persona_ids: String = row.get(4)?;
    Ok(CalibrationRun {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        model: row.get(3)?,
        persona_ids: serde_json::from_str(&persona_ids)
            .map_err(|e| StoreError::Decode(format!("persona_ids: {e}")))?,
        item_filter: row.get(5)?,
        n_items: row.get::<_, i64>(6)? as usize,
        n_personas: row.get::<_, i64>(7)? as usize,
        n_trials: row.get(8)?,
        status: RunStatus::parse(&row.get::<_, String>(9)?)?,
        total_responses: row.get::<_, Option<i64>>(10)?.map(|v| v as u64),
        total_cost_usd: row.get(11)?,
        started_at: parse_ts(&row.get::<_, String>(12)?)?,
        completed_at: row
            .get::<_, Option<String>>(13)?
            .map(|s| parse_ts(&s))
            .transpose()?,
    })
}

fn row_to_response(row: &rusqlite::Row<'_>) -> Result<ResponseRecord, StoreError> {
    Ok(ResponseRecord {
        run_id: row.get(0)?,
        item_id: row.get(1)?,
        persona_id: row.get(2)?,
        trial: row.get(3)?,
        selected: parse_key(&row.get::<_, String>(4)?)?,
        is_correct: row.get(5)?,
        rationale: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        latency_ms: row.get::<_, Option<i64>>(7)?.unwrap_or(0).max(0) as u64,
        input_tokens: row.get::<_, Option<u32>>(8)?.unwrap_or(0),
        output_tokens: row.get::<_, Option<u32>>(9)?.unwrap_or(0),
        model: row.get(10)?,
    })
}

fn row_to_statistics(row: &rusqlite::Row<'_>) -> Result<ItemStatistics, StoreError> {
    let flags: String = row.get(11)?;
    let flags: Vec<ItemFlag> =
        serde_json::from_str(&flags).map_err(|e| StoreError::Decode(format!("flags: {e}")))?;
    Ok(ItemStatistics {
        item_id: row.get(0)?,
        n_responses: row.get::<_, i64>(1)? as usize,
        difficulty_index: row.get(2)?,
        point_biserial: row.get(3)?,
        option_rates: OptionRates {
            a: row.get(4)?,
            b: row.get(5)?,
            c: row.get(6)?,
            d: row.get(7)?,
        },
        functional_distractors: row.get(8)?,
        nonfunctional_distractors: row.get(9)?,
        response_variance: row.get(10)?,
        flags,
        quality_score: row.get(12)?,
    })
}
