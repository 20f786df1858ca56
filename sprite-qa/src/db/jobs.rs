//! Analysis job queue persistence
//!
//! Every status change is one conditional UPDATE whose WHERE clause names
//! the expected current status, so concurrent workers can never both move
//! the same job.

use chrono::{DateTime, Utc};
use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;
use crate::models::{AnalysisJob, JobStatus};
use crate::utils::retry_on_lock;

const JOB_COLUMNS: &str = "id, generation_id, status, priority, retry_count, error_message, \
                           created_at, started_at, completed_at, updated_at";

fn job_from_row(row: &SqliteRow) -> Result<AnalysisJob> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(AnalysisJob {
        id: parse_uuid(&id)?,
        generation_id: row.try_get("generation_id")?,
        status: JobStatus::parse(&status)?,
        priority: row.try_get("priority")?,
        retry_count: row.try_get("retry_count")?,
        error_message: row.try_get("error_message")?,
        created_at: time::from_db(&created_at)?,
        started_at: time::from_db_opt(row.try_get("started_at")?)?,
        completed_at: time::from_db_opt(row.try_get("completed_at")?)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Create the job for a generation, or update its priority if it exists
pub async fn enqueue(pool: &SqlitePool, generation_id: &str, priority: i64) -> Result<AnalysisJob> {
    let now = time::now_db();

    sqlx::query(
        r#"
        INSERT INTO analysis_jobs (id, generation_id, status, priority, retry_count, created_at, updated_at)
        VALUES (?, ?, 'pending', ?, 0, ?, ?)
        ON CONFLICT(generation_id) DO UPDATE SET
            priority = excluded.priority,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(generation_id)
    .bind(priority)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let row = sqlx::query(&format!(
        "SELECT {} FROM analysis_jobs WHERE generation_id = ?",
        JOB_COLUMNS
    ))
    .bind(generation_id)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Load a job by id
pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<AnalysisJob>> {
    let row = sqlx::query(&format!("SELECT {} FROM analysis_jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Pending jobs, highest priority first, then oldest first
pub async fn list_pending(pool: &SqlitePool, limit: i64) -> Result<Vec<AnalysisJob>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM analysis_jobs
        WHERE status = 'pending'
        ORDER BY priority DESC, created_at ASC, rowid ASC
        LIMIT ?
        "#,
        JOB_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Atomically move a job from pending to processing
///
/// Returns false when the job was not pending (already claimed, finished,
/// or unknown). A lost race is not an error.
pub async fn claim(pool: &SqlitePool, id: Uuid, max_wait_ms: u64) -> Result<bool> {
    let id = id.to_string();
    let id_ref = id.as_str();

    let affected = retry_on_lock("claim_job", max_wait_ms, || async move {
        let now = time::now_db();
        let result = sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'processing', started_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id_ref)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    })
    .await?;

    Ok(affected == 1)
}

/// Move a processing job to completed
pub async fn mark_completed(conn: &mut SqliteConnection, id: Uuid) -> Result<bool> {
    let now = time::now_db();
    let result = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'completed', completed_at = ?, error_message = NULL, updated_at = ?
        WHERE id = ? AND status = 'processing'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a failed attempt on a processing job
///
/// The job returns to pending while `retry_count < max_retries` and the
/// failure is retryable; otherwise it becomes failed. Either way the retry
/// count increments and the message is stored. Returns the new status and
/// retry count, or `None` if the job was not processing.
pub async fn record_failure(
    pool: &SqlitePool,
    id: Uuid,
    error_message: &str,
    max_retries: i64,
    retryable: bool,
    max_wait_ms: u64,
) -> Result<Option<(JobStatus, i64)>> {
    let id = id.to_string();
    let id_ref = id.as_str();

    let row = retry_on_lock("record_job_failure", max_wait_ms, || async move {
        let row = sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = CASE WHEN ? AND retry_count < ? THEN 'pending' ELSE 'failed' END,
                retry_count = retry_count + 1,
                error_message = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            RETURNING status, retry_count
            "#,
        )
        .bind(retryable)
        .bind(max_retries)
        .bind(error_message)
        .bind(time::now_db())
        .bind(id_ref)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    })
    .await?;

    match row {
        Some(row) => {
            let status: String = row.try_get("status")?;
            let retry_count: i64 = row.try_get("retry_count")?;
            Ok(Some((JobStatus::parse(&status)?, retry_count)))
        }
        None => Ok(None),
    }
}

/// Jobs released from an abandoned `processing` claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleRecovery {
    pub requeued: u64,
    pub failed: u64,
}

/// Release jobs claimed before `started_before` that never finished
///
/// A crash, a dropped request, or a failed failure-write leaves the claim
/// behind. The interrupted attempt is charged against the retry budget the
/// same way `record_failure` charges a retryable failure.
pub async fn requeue_stale_processing(
    pool: &SqlitePool,
    started_before: DateTime<Utc>,
    max_retries: i64,
) -> Result<StaleRecovery> {
    let rows = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = CASE WHEN retry_count < ? THEN 'pending' ELSE 'failed' END,
            retry_count = retry_count + 1,
            error_message = 'interrupted: analysis attempt never finished',
            updated_at = ?
        WHERE status = 'processing' AND (started_at IS NULL OR started_at <= ?)
        RETURNING status
        "#,
    )
    .bind(max_retries)
    .bind(time::now_db())
    .bind(time::to_db(started_before))
    .fetch_all(pool)
    .await?;

    let mut recovery = StaleRecovery::default();
    for row in &rows {
        let status: String = row.try_get("status")?;
        match JobStatus::parse(&status)? {
            JobStatus::Pending => recovery.requeued += 1,
            _ => recovery.failed += 1,
        }
    }
    Ok(recovery)
}

/// Number of jobs currently in `status`
pub async fn count_by_status(pool: &SqlitePool, status: JobStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_jobs WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
