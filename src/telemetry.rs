//! Telemetry: structured logs plus a SQLite log of agent turns
//!
//! Logs go to a daily-rolling JSON file (and the console when verbose).
//! Every turn driven through the CLI is also recorded in `telemetry.db`
//! next to the logs, with one row per tool call, so runs can be inspected
//! after the fact.

use crate::config::TelemetryConfig;
use crate::events::{ExecutionOutcome, ToolCallTrace, TurnCompleteReason};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Log file prefix inside the log directory
pub const LOG_FILE: &str = "agent_platform.log";

/// Install the global subscriber. Keep the guard alive for the life of the
/// process or buffered file logs are lost.
pub fn init_logging(log_dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
        }
    });

    let console_layer = verbose.then(|| fmt::layer().with_target(false).compact());
    let file_layer = fmt::layer().json().with_writer(non_blocking);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();
    Ok(guard)
}

struct TelemetryDb {
    conn: Connection,
}

impl TelemetryDb {
    fn open(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                provider TEXT,
                model TEXT
            );

            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                model TEXT,
                reason TEXT,
                tool_call_count INTEGER NOT NULL,
                duration_ms INTEGER,
                error TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES runs(id)
            );

            CREATE TABLE IF NOT EXISTS tool_calls (
                id TEXT PRIMARY KEY,
                turn_id TEXT NOT NULL,
                tool_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                arguments TEXT,
                result TEXT,
                FOREIGN KEY (turn_id) REFERENCES turns(id)
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
            CREATE INDEX IF NOT EXISTS idx_tool_calls_tool ON tool_calls(tool_id);
        "#,
        )?;
        Ok(Self { conn })
    }

    fn insert_run(&self, id: Uuid, provider: Option<&str>, model: Option<&str>) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO runs (id, started_at, provider, model) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), Utc::now().to_rfc3339(), provider, model],
        )?;
        Ok(())
    }

    fn insert_turn(&mut self, run_id: Uuid, turn: &TurnRecord) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        let turn_id = Uuid::new_v4().to_string();
        tx.execute(
            r#"INSERT INTO turns
               (id, run_id, session_id, agent_id, model, reason, tool_call_count,
                duration_ms, error, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                turn_id,
                run_id.to_string(),
                turn.session_id,
                turn.agent_id,
                turn.model,
                turn.reason,
                turn.tool_calls.len() as i64,
                turn.duration_ms as i64,
                turn.error,
                Utc::now().to_rfc3339()
            ],
        )?;
        for call in &turn.tool_calls {
            tx.execute(
                r#"INSERT INTO tool_calls (id, turn_id, tool_id, success, arguments, result)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    Uuid::new_v4().to_string(),
                    turn_id,
                    call.tool_id,
                    call.success,
                    call.arguments,
                    call.result
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// One tool call as logged
#[derive(Debug, Clone)]
pub struct ToolCallLog {
    pub tool_id: String,
    pub success: bool,
    pub arguments: String,
    pub result: String,
}

/// One agent turn as logged
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub session_id: String,
    pub agent_id: String,
    pub model: Option<String>,
    pub reason: Option<String>,
    pub tool_calls: Vec<ToolCallLog>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl TurnRecord {
    pub fn completed(
        session_id: &str,
        agent_id: &str,
        model: &str,
        reason: TurnCompleteReason,
        traces: &[ToolCallTrace],
        duration_ms: u64,
    ) -> Self {
        let reason = match reason {
            TurnCompleteReason::TextResponse => "text_response",
            TurnCompleteReason::MaxIterations => "max_iterations",
        };
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            model: Some(model.to_string()),
            reason: Some(reason.to_string()),
            tool_calls: traces
                .iter()
                .map(|t| ToolCallLog {
                    tool_id: t.tool_id.clone(),
                    success: t.result.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
                    arguments: t.args.to_string(),
                    result: t.result.to_string(),
                })
                .collect(),
            duration_ms,
            error: None,
        }
    }

    pub fn from_outcome(
        session_id: &str,
        agent_id: &str,
        outcome: &ExecutionOutcome,
        duration_ms: u64,
    ) -> Self {
        Self::completed(
            session_id,
            agent_id,
            &outcome.model,
            outcome.reason,
            &outcome.tool_calls,
            duration_ms,
        )
    }

    pub fn failed(session_id: &str, agent_id: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            model: None,
            reason: None,
            tool_calls: Vec::new(),
            duration_ms,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolUsageStat {
    pub tool_id: String,
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl std::fmt::Display for ToolUsageStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<40} calls: {:>4} | ok: {:>4} | failed: {:>4}",
            self.tool_id, self.call_count, self.success_count, self.error_count
        )
    }
}

/// Logging guard plus the turn database
pub struct Telemetry {
    run_id: Uuid,
    db: Mutex<TelemetryDb>,
    log_dir: PathBuf,
    _file_guard: Option<WorkerGuard>,
}

impl Telemetry {
    /// Initialize logging and open `telemetry.db` in the log directory
    pub fn init(
        config: &TelemetryConfig,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> anyhow::Result<Self> {
        let guard = init_logging(&config.log_dir, config.verbose)?;
        let db = TelemetryDb::open(Connection::open(config.log_dir.join("telemetry.db"))?)?;
        let run_id = Uuid::new_v4();
        db.insert_run(run_id, provider, model)?;

        tracing::info!(
            run_id = %run_id,
            log_dir = %config.log_dir.display(),
            "Telemetry initialized"
        );
        Ok(Self {
            run_id,
            db: Mutex::new(db),
            log_dir: config.log_dir.clone(),
            _file_guard: Some(guard),
        })
    }

    /// In-memory database, no subscriber (for testing)
    pub fn minimal() -> anyhow::Result<Self> {
        let db = TelemetryDb::open(Connection::open_in_memory()?)?;
        let run_id = Uuid::new_v4();
        db.insert_run(run_id, None, None)?;
        Ok(Self {
            run_id,
            db: Mutex::new(db),
            log_dir: PathBuf::new(),
            _file_guard: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Record a turn; failures are logged and otherwise ignored
    pub fn record_turn(&self, turn: &TurnRecord) {
        let result = match self.db.lock() {
            Ok(mut db) => db.insert_turn(self.run_id, turn),
            Err(_) => Err(anyhow::anyhow!("telemetry database lock poisoned")),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record turn");
        }
    }

    /// Per-tool call counts across all runs
    pub fn tool_stats(&self) -> anyhow::Result<Vec<ToolUsageStat>> {
        let db = self
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("telemetry database lock poisoned"))?;
        let mut stmt = db.conn.prepare(
            r#"SELECT tool_id, COUNT(*), SUM(success), SUM(1 - success)
               FROM tool_calls GROUP BY tool_id ORDER BY COUNT(*) DESC, tool_id"#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ToolUsageStat {
                tool_id: row.get(0)?,
                call_count: row.get::<_, i64>(1)? as u64,
                success_count: row.get::<_, i64>(2)? as u64,
                error_count: row.get::<_, i64>(3)? as u64,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Number of turns recorded for a session
    pub fn turn_count(&self, session_id: &str) -> anyhow::Result<u64> {
        let db = self
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("telemetry database lock poisoned"))?;
        let count: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
