use super::RunStore;
use super::types::{AttemptRecord, NewRun, PolicyVersion, Run, RunStatus, RunSummary};
use crate::eval::{Evaluation, ScoreBreakdown, Violation};
use crate::policy::Policy;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use uuid::Uuid;

/// SQLite-backed run store using sqlx async pool.
pub struct SqliteRunStore {
    pool: SqlitePool,
}

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "run_schema_version";
const SCHEMA_VERSION: u32 = 1;

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load run schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid run schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible run schema version: stored={parsed}, expected={SCHEMA_VERSION}. \
remove the run database and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist run schema version")?;

    Ok(())
}

impl SqliteRunStore {
    /// Create a new store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        ensure_schema_version(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (
                 id TEXT PRIMARY KEY,
                 title TEXT NOT NULL,
                 task_text TEXT NOT NULL,
                 max_attempts INTEGER NOT NULL,
                 target_score INTEGER NOT NULL,
                 status TEXT NOT NULL DEFAULT 'pending',
                 created_at TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .context("create runs table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS attempts (
                 id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                 attempt_index INTEGER NOT NULL,
                 output_text TEXT NOT NULL,
                 score_total INTEGER NOT NULL,
                 score_breakdown TEXT NOT NULL,
                 violations TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 UNIQUE(run_id, attempt_index)
             )",
        )
        .execute(&pool)
        .await
        .context("create attempts table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS policy_versions (
                 id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                 version INTEGER NOT NULL,
                 policy TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 UNIQUE(run_id, version)
             )",
        )
        .execute(&pool)
        .await
        .context("create policy_versions table")?;

        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("open run database {}", path.display()))?;

        Self::new(pool).await
    }

    /// Private in-memory database, for tests and throwaway demos.
    pub async fn open_in_memory() -> Result<Self> {
        // Every connection to `sqlite::memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory run database")?;
        Self::new(pool).await
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Violations and notes share one column.
#[derive(Serialize)]
struct ViolationsColumn<'a> {
    violations: &'a [Violation],
    notes: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredViolations {
    Wrapped {
        #[serde(default)]
        violations: Vec<Violation>,
        #[serde(default)]
        notes: String,
    },
    Bare(Vec<Violation>),
}

fn decode_violations(raw: &str) -> Result<(Vec<Violation>, String)> {
    let stored: StoredViolations =
        serde_json::from_str(raw).context("deserialize attempt violations")?;
    Ok(match stored {
        StoredViolations::Wrapped { violations, notes } => (violations, notes),
        StoredViolations::Bare(violations) => (violations, String::new()),
    })
}

fn now() -> (DateTime<Utc>, String) {
    let timestamp = Utc::now().trunc_subsecs(6);
    (timestamp, timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn parse_status(raw: &str) -> Result<RunStatus> {
    RunStatus::from_str(raw).map_err(|_| anyhow::anyhow!("unknown run status: {raw}"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp: {raw}"))?
        .with_timezone(&Utc))
}

fn get_u32(row: &SqliteRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).with_context(|| format!("{column} out of range: {value}"))
}

fn map_run_row(row: &SqliteRow) -> Result<Run> {
    let status_raw: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Run {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        task_text: row.try_get("task_text")?,
        max_attempts: get_u32(row, "max_attempts")?,
        target_score: get_u32(row, "target_score")?,
        status: parse_status(&status_raw)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn map_summary_row(row: &SqliteRow) -> Result<RunSummary> {
    let status_raw: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let best_score: Option<i64> = row.try_get("best_score")?;

    Ok(RunSummary {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        status: parse_status(&status_raw)?,
        created_at: parse_timestamp(&created_at)?,
        attempt_count: get_u32(row, "attempt_count")?,
        best_score: best_score
            .map(u32::try_from)
            .transpose()
            .context("best_score out of range")?,
    })
}

fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord> {
    let breakdown_raw: String = row.try_get("score_breakdown")?;
    let violations_raw: String = row.try_get("violations")?;
    let created_at: String = row.try_get("created_at")?;
    let score_breakdown: ScoreBreakdown =
        serde_json::from_str(&breakdown_raw).context("deserialize score breakdown")?;
    let (violations, notes) = decode_violations(&violations_raw)?;

    Ok(AttemptRecord {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        index: get_u32(row, "attempt_index")?,
        output_text: row.try_get("output_text")?,
        score_total: get_u32(row, "score_total")?,
        score_breakdown,
        violations,
        notes,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn map_policy_row(row: &SqliteRow) -> Result<PolicyVersion> {
    let policy_raw: String = row.try_get("policy")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(PolicyVersion {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        version: get_u32(row, "version")?,
        policy: serde_json::from_str(&policy_raw).context("deserialize policy")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

impl RunStore for SqliteRunStore {
    fn create_run<'a>(
        &'a self,
        new_run: &'a NewRun,
    ) -> Pin<Box<dyn Future<Output = Result<Run>> + Send + 'a>> {
        Box::pin(async move {
            let run_id = Uuid::new_v4().to_string();
            let (created_at, timestamp) = now();
            let status = RunStatus::Pending;

            sqlx::query(
                "INSERT INTO runs (id, title, task_text, max_attempts, target_score, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&run_id)
            .bind(&new_run.title)
            .bind(&new_run.task_text)
            .bind(i64::from(new_run.max_attempts))
            .bind(i64::from(new_run.target_score))
            .bind(status.to_string())
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .context("insert run")?;

            Ok(Run {
                id: run_id,
                title: new_run.title.clone(),
                task_text: new_run.task_text.clone(),
                max_attempts: new_run.max_attempts,
                target_score: new_run.target_score,
                status,
                created_at,
            })
        })
    }

    fn get_run<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Run>>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, title, task_text, max_attempts, target_score, status, created_at
                 FROM runs
                 WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("query run by id")?;

            row.map(|r| map_run_row(&r)).transpose()
        })
    }

    fn list_runs<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RunSummary>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT r.id, r.title, r.status, r.created_at,
                        COUNT(a.id) AS attempt_count,
                        MAX(a.score_total) AS best_score
                 FROM runs r
                 LEFT JOIN attempts a ON a.run_id = r.id
                 GROUP BY r.id
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )
            .fetch_all(&self.pool)
            .await
            .context("list runs")?;

            rows.iter().map(map_summary_row).collect()
        })
    }

    fn update_run_status<'a>(
        &'a self,
        id: &'a str,
        status: RunStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE runs SET status = $1 WHERE id = $2")
                .bind(status.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("set run status to {status}"))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_run<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.context("begin delete run")?;

            sqlx::query("DELETE FROM attempts WHERE run_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM policy_versions WHERE run_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM runs WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await.context("commit delete run")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn insert_attempt<'a>(
        &'a self,
        run_id: &'a str,
        index: u32,
        output_text: &'a str,
        evaluation: &'a Evaluation,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptRecord>> + Send + 'a>> {
        Box::pin(async move {
            let attempt_id = Uuid::new_v4().to_string();
            let (created_at, timestamp) = now();
            let score_total = evaluation.rounded_total();
            let breakdown_json = serde_json::to_string(&evaluation.score_breakdown)?;
            let violations_json = serde_json::to_string(&ViolationsColumn {
                violations: &evaluation.violations,
                notes: &evaluation.notes,
            })?;

            sqlx::query(
                "INSERT INTO attempts (id, run_id, attempt_index, output_text, score_total, score_breakdown, violations, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&attempt_id)
            .bind(run_id)
            .bind(i64::from(index))
            .bind(output_text)
            .bind(i64::from(score_total))
            .bind(&breakdown_json)
            .bind(&violations_json)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert attempt {index}"))?;

            Ok(AttemptRecord {
                id: attempt_id,
                run_id: run_id.to_string(),
                index,
                output_text: output_text.to_string(),
                score_total,
                score_breakdown: evaluation.score_breakdown,
                violations: evaluation.violations.clone(),
                notes: evaluation.notes.clone(),
                created_at,
            })
        })
    }

    fn list_attempts<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AttemptRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, run_id, attempt_index, output_text, score_total, score_breakdown, violations, created_at
                 FROM attempts
                 WHERE run_id = $1
                 ORDER BY attempt_index ASC",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .context("list attempts")?;

            rows.iter().map(map_attempt_row).collect()
        })
    }

    fn delete_attempts<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM attempts WHERE run_id = $1")
                .bind(run_id)
                .execute(&self.pool)
                .await
                .context("delete attempts")?;

            #[allow(clippy::cast_possible_truncation)]
            Ok(result.rows_affected() as usize)
        })
    }

    fn insert_policy_version<'a>(
        &'a self,
        run_id: &'a str,
        policy: &'a Policy,
    ) -> Pin<Box<dyn Future<Output = Result<PolicyVersion>> + Send + 'a>> {
        Box::pin(async move {
            let version_id = Uuid::new_v4().to_string();
            let (created_at, timestamp) = now();
            let policy_json = serde_json::to_string(policy)?;

            sqlx::query(
                "INSERT INTO policy_versions (id, run_id, version, policy, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&version_id)
            .bind(run_id)
            .bind(i64::from(policy.version))
            .bind(&policy_json)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert policy version {}", policy.version))?;

            Ok(PolicyVersion {
                id: version_id,
                run_id: run_id.to_string(),
                version: policy.version,
                policy: policy.clone(),
                created_at,
            })
        })
    }

    fn list_policy_versions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PolicyVersion>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, run_id, version, policy, created_at
                 FROM policy_versions
                 WHERE run_id = $1
                 ORDER BY version ASC",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .context("list policy versions")?;

            rows.iter().map(map_policy_row).collect()
        })
    }

    fn delete_policy_versions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM policy_versions WHERE run_id = $1")
                .bind(run_id)
                .execute(&self.pool)
                .await
                .context("delete policy versions")?;

            #[allow(clippy::cast_possible_truncation)]
            Ok(result.rows_affected() as usize)
        })
    }
}
