//! SQLite result sink
//!
//! Persists scan jobs, per-item results and failures. Every call runs on the
//! blocking pool with its own pooled connection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sellerscan_core::ResultSink;
use sellerscan_domain::{
    FailureKind, Job, JobCounters, JobId, JobStatus, JobUpdate, Result as DomainResult,
    ScanConfig, ScanFailure, ScanResult, SellerScanError,
};
use serde_json::Value;
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed implementation of [`ResultSink`]
pub struct SqliteResultSink {
    db: Arc<DbManager>,
}

impl SqliteResultSink {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultSink for SqliteResultSink {
    async fn create_job(
        &self,
        total_items: u64,
        source: &str,
        config: &ScanConfig,
    ) -> DomainResult<JobId> {
        let db = Arc::clone(&self.db);
        let job = Job::pending(total_items, source.to_string(), config.clone());

        task::spawn_blocking(move || -> DomainResult<JobId> {
            let conn = db.get_connection()?;
            insert_job(&conn, &job)?;
            debug!(job_id = %job.id, total_items, "scan job created");
            Ok(job.id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update_job_status(&self, job_id: JobId, update: &JobUpdate) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let update = update.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            update_job(&conn, job_id, &update)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_job(&self, job_id: JobId) -> DomainResult<Job> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Job> {
            let conn = db.get_connection()?;
            query_job(&conn, job_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn append_result(
        &self,
        job_id: JobId,
        identifier: &str,
        payload: &Value,
    ) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let result = ScanResult::new(job_id, identifier, payload.clone());

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            insert_result(&conn, &result)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn append_failure(
        &self,
        job_id: JobId,
        identifier: &str,
        attempts: u32,
        kind: FailureKind,
        reason: &str,
    ) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let failure = ScanFailure::new(job_id, identifier, attempts, kind, reason);

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            insert_failure(&conn, &failure)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_results(&self, job_id: JobId) -> DomainResult<Vec<ScanResult>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<ScanResult>> {
            let conn = db.get_connection()?;
            query_results(&conn, job_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_failures(&self, job_id: JobId) -> DomainResult<Vec<ScanFailure>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<ScanFailure>> {
            let conn = db.get_connection()?;
            query_failures(&conn, job_id)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

fn insert_job(conn: &Connection, job: &Job) -> DomainResult<()> {
    let config = serde_json::to_string(&job.config)
        .map_err(|e| SellerScanError::Internal(format!("serialize scan config: {e}")))?;

    conn.execute(
        "INSERT INTO scan_jobs (id, status, total_items, processed_count, success_count,
                                failure_count, config, source, created_at, started_at,
                                completed_at, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.id.to_string(),
            job.status.to_string(),
            to_sql_count(job.total_items),
            to_sql_count(job.counters.processed_count),
            to_sql_count(job.counters.success_count),
            to_sql_count(job.counters.failure_count),
            config,
            job.source,
            job.created_at.to_rfc3339(),
            job.started_at.map(|at| at.to_rfc3339()),
            job.completed_at.map(|at| at.to_rfc3339()),
            job.error,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

/// Timestamps and error only overwrite when the update carries them.
fn update_job(conn: &Connection, job_id: JobId, update: &JobUpdate) -> DomainResult<()> {
    let changed = conn
        .execute(
            "UPDATE scan_jobs
             SET status = ?2,
                 processed_count = ?3,
                 success_count = ?4,
                 failure_count = ?5,
                 started_at = COALESCE(?6, started_at),
                 completed_at = COALESCE(?7, completed_at),
                 error = COALESCE(?8, error)
             WHERE id = ?1",
            params![
                job_id.to_string(),
                update.status.to_string(),
                to_sql_count(update.counters.processed_count),
                to_sql_count(update.counters.success_count),
                to_sql_count(update.counters.failure_count),
                update.started_at.map(|at| at.to_rfc3339()),
                update.completed_at.map(|at| at.to_rfc3339()),
                update.error,
            ],
        )
        .map_err(map_sql_error)?;

    if changed == 0 {
        return Err(SellerScanError::NotFound(format!("scan job {job_id}")));
    }
    Ok(())
}

fn query_job(conn: &Connection, job_id: JobId) -> DomainResult<Job> {
    let row = conn
        .query_row(
            "SELECT id, status, total_items, processed_count, success_count, failure_count,
                    config, source, created_at, started_at, completed_at, error
             FROM scan_jobs
             WHERE id = ?1",
            params![job_id.to_string()],
            JobRow::from_row,
        )
        .optional()
        .map_err(map_sql_error)?;

    row.ok_or_else(|| SellerScanError::NotFound(format!("scan job {job_id}")))?.into_job()
}

fn insert_result(conn: &Connection, result: &ScanResult) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO scan_results (id, job_id, identifier, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            result.id.to_string(),
            result.job_id.to_string(),
            result.identifier,
            result.payload.to_string(),
            result.created_at.to_rfc3339(),
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn insert_failure(conn: &Connection, failure: &ScanFailure) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO scan_failures (id, job_id, identifier, attempts, kind, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            failure.id.to_string(),
            failure.job_id.to_string(),
            failure.identifier,
            failure.attempts,
            failure.kind.to_string(),
            failure.reason,
            failure.created_at.to_rfc3339(),
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn query_results(conn: &Connection, job_id: JobId) -> DomainResult<Vec<ScanResult>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job_id, identifier, payload, created_at
             FROM scan_results
             WHERE job_id = ?1
             ORDER BY created_at ASC, id ASC",
        )
        .map_err(map_sql_error)?;

    let rows = stmt
        .query_map(params![job_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(map_sql_error)?;

    let mut results = Vec::new();
    for row in rows {
        let (id, job_id, identifier, payload, created_at) = row.map_err(map_sql_error)?;
        results.push(ScanResult {
            id: parse_uuid(&id)?,
            job_id: parse_uuid(&job_id)?,
            identifier,
            payload: serde_json::from_str(&payload)
                .map_err(|e| SellerScanError::Database(format!("corrupt result payload: {e}")))?,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(results)
}

fn query_failures(conn: &Connection, job_id: JobId) -> DomainResult<Vec<ScanFailure>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job_id, identifier, attempts, kind, reason, created_at
             FROM scan_failures
             WHERE job_id = ?1
             ORDER BY created_at ASC, id ASC",
        )
        .map_err(map_sql_error)?;

    let rows = stmt
        .query_map(params![job_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(map_sql_error)?;

    let mut failures = Vec::new();
    for row in rows {
        let (id, job_id, identifier, attempts, kind, reason, created_at) =
            row.map_err(map_sql_error)?;
        failures.push(ScanFailure {
            id: parse_uuid(&id)?,
            job_id: parse_uuid(&job_id)?,
            identifier,
            attempts,
            kind: kind.parse::<FailureKind>().map_err(SellerScanError::Database)?,
            reason,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(failures)
}

/// Raw column values of one `scan_jobs` row
struct JobRow {
    id: String,
    status: String,
    total_items: i64,
    processed_count: i64,
    success_count: i64,
    failure_count: i64,
    config: String,
    source: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            total_items: row.get(2)?,
            processed_count: row.get(3)?,
            success_count: row.get(4)?,
            failure_count: row.get(5)?,
            config: row.get(6)?,
            source: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            error: row.get(11)?,
        })
    }

    fn into_job(self) -> DomainResult<Job> {
        Ok(Job {
            id: parse_uuid(&self.id)?,
            status: self.status.parse::<JobStatus>().map_err(SellerScanError::Database)?,
            total_items: from_sql_count(self.total_items),
            counters: JobCounters {
                processed_count: from_sql_count(self.processed_count),
                success_count: from_sql_count(self.success_count),
                failure_count: from_sql_count(self.failure_count),
            },
            config: serde_json::from_str(&self.config)
                .map_err(|e| SellerScanError::Database(format!("corrupt scan config: {e}")))?,
            source: self.source,
            created_at: parse_timestamp(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            error: self.error,
        })
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn parse_uuid(value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| SellerScanError::Database(format!("invalid uuid '{value}': {e}")))
}

fn parse_timestamp(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| SellerScanError::Database(format!("invalid timestamp '{value}': {e}")))
}

fn map_join_error(err: task::JoinError) -> SellerScanError {
    if err.is_cancelled() {
        SellerScanError::Internal("blocking task cancelled".into())
    } else {
        SellerScanError::Internal(format!("blocking task failed: {err}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
