//! Analysis job queue worker
//!
//! Jobs move pending → processing → completed, or back to pending with an
//! incremented retry count, or to failed once the retry budget is spent.
//! The claim is a single conditional update, so two workers racing on one
//! job never both process it.
//!
//! Draining is sequential with a short pause between jobs to keep load on
//! the vision service flat.

use serde::Serialize;
use sprite_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::fix_learner::learn_from_observation;
use super::keywords::derive_prevention_clause;
use super::outcome_aggregator::record_outcome;
use super::pattern_tracker::record_occurrence;
use super::vision_client::{VisionAnalyzer, VisionError};
use crate::db;
use crate::models::{AnalysisJob, JobOutcome, JobStatus};
use crate::utils::begin_monitored;

/// Worker tunables
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_retries: i64,
    /// Retry jobs whose analyzer response could not be parsed
    pub retry_malformed: bool,
    /// Pause between jobs within one drain
    pub job_delay: Duration,
    pub max_lock_wait_ms: u64,
    /// Claims older than this are treated as abandoned by the periodic loop
    pub stale_after: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_malformed: true,
            job_delay: Duration::from_millis(500),
            max_lock_wait_ms: 5000,
            stale_after: Duration::from_secs(600),
        }
    }
}

/// Why one analysis attempt failed
#[derive(Debug, ThisError)]
enum AttemptError {
    #[error("generation {0} not found")]
    MissingGeneration(String),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Database(#[from] Error),
}

/// Tally of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub processed: usize,
    pub completed: usize,
    pub hallucinations: usize,
    pub retrying: usize,
    pub failed: usize,
    pub not_claimed: usize,
    pub errors: usize,
    pub cancelled: bool,
}

pub struct AnalysisWorker {
    db: SqlitePool,
    vision: Arc<dyn VisionAnalyzer>,
    settings: WorkerSettings,
}

impl AnalysisWorker {
    pub fn new(db: SqlitePool, vision: Arc<dyn VisionAnalyzer>, settings: WorkerSettings) -> Self {
        Self {
            db,
            vision,
            settings,
        }
    }

    /// Queue a generation for analysis; re-enqueueing only changes priority
    pub async fn enqueue(&self, generation_id: &str, priority: i64) -> Result<AnalysisJob> {
        if db::generations::get_generation(&self.db, generation_id)
            .await?
            .is_none()
        {
            return Err(Error::NotFound(format!("generation {}", generation_id)));
        }

        let job = db::jobs::enqueue(&self.db, generation_id, priority).await?;
        tracing::debug!(job_id = %job.id, generation_id, priority, "Analysis job enqueued");
        Ok(job)
    }

    /// Oldest, highest-priority pending jobs
    pub async fn drain_pending(&self, limit: i64) -> Result<Vec<AnalysisJob>> {
        db::jobs::list_pending(&self.db, limit).await
    }

    /// Return abandoned `processing` claims to the queue
    ///
    /// Claims started more than `older_than` ago are released; at startup
    /// `Duration::ZERO` releases every claim left by a previous run.
    pub async fn recover_stale(&self, older_than: Duration) -> Result<db::jobs::StaleRecovery> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::InvalidInput(format!("stale threshold out of range: {}", e)))?;
        let recovery = db::jobs::requeue_stale_processing(
            &self.db,
            chrono::Utc::now() - older_than,
            self.settings.max_retries,
        )
        .await?;

        if recovery.requeued > 0 || recovery.failed > 0 {
            tracing::warn!(
                requeued = recovery.requeued,
                failed = recovery.failed,
                "Released abandoned analysis jobs"
            );
        }
        Ok(recovery)
    }

    /// Claim and run one job
    pub async fn process_job(&self, job_id: Uuid) -> Result<JobOutcome> {
        let job = db::jobs::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("analysis job {}", job_id)))?;

        if !db::jobs::claim(&self.db, job_id, self.settings.max_lock_wait_ms).await? {
            tracing::debug!(job_id = %job_id, status = job.status.as_str(), "Job not claimed");
            return Ok(JobOutcome::NotClaimed);
        }

        match self.analyze(&job).await {
            Ok(has_hallucination) => {
                tracing::info!(
                    job_id = %job_id,
                    generation_id = %job.generation_id,
                    has_hallucination,
                    "Analysis job completed"
                );
                Ok(JobOutcome::Completed { has_hallucination })
            }
            Err(err) => self.fail(&job, err).await,
        }
    }

    async fn fail(&self, job: &AnalysisJob, err: AttemptError) -> Result<JobOutcome> {
        let retryable = match &err {
            AttemptError::Vision(e) if e.is_malformed() => self.settings.retry_malformed,
            _ => true,
        };
        let message = err.to_string();

        let recorded = db::jobs::record_failure(
            &self.db,
            job.id,
            &message,
            self.settings.max_retries,
            retryable,
            self.settings.max_lock_wait_ms,
        )
        .await?;

        match recorded {
            Some((JobStatus::Pending, retry_count)) => {
                tracing::warn!(
                    job_id = %job.id,
                    retry_count,
                    error = %message,
                    "Analysis attempt failed, job requeued"
                );
                Ok(JobOutcome::Retrying {
                    retry_count,
                    error: message,
                })
            }
            Some((_, retry_count)) => {
                tracing::error!(
                    job_id = %job.id,
                    retry_count,
                    error = %message,
                    "Analysis job failed permanently"
                );
                Ok(JobOutcome::Failed {
                    retry_count,
                    error: message,
                })
            }
            None => Err(Error::Internal(format!(
                "analysis job {} left processing state during failure handling",
                job.id
            ))),
        }
    }

    /// Analyse the generation and persist everything learned from it,
    /// completing the job in the same transaction
    async fn analyze(&self, job: &AnalysisJob) -> std::result::Result<bool, AttemptError> {
        let generation = db::generations::get_generation(&self.db, &job.generation_id)
            .await?
            .ok_or_else(|| AttemptError::MissingGeneration(job.generation_id.clone()))?;

        let result = self
            .vision
            .analyze(&generation.image_url, &generation.prompt, &generation.key)
            .await?;

        let mut tx = begin_monitored(&self.db, "worker::persist_analysis").await?;
        db::analyses::upsert_analysis(tx.conn(), &generation.id, &result).await?;

        if let (true, Some(kind)) = (result.has_hallucination, result.hallucination_type.as_deref())
        {
            let clause = derive_prevention_clause(
                result.suggested_fix.as_deref(),
                kind,
                &result.missing_elements,
                &result.extra_elements,
            );
            record_occurrence(
                tx.conn(),
                &generation.key,
                &generation.prompt,
                kind,
                clause.as_deref(),
            )
            .await?;
            learn_from_observation(
                tx.conn(),
                &generation.key,
                kind,
                clause.as_deref(),
                &result.missing_elements,
                &result.extra_elements,
            )
            .await?;
        }

        record_outcome(tx.conn(), &generation.key, &generation.prompt, &result).await?;

        if !db::jobs::mark_completed(tx.conn(), job.id).await? {
            tx.rollback().await?;
            return Err(AttemptError::Database(Error::Internal(format!(
                "analysis job {} is no longer processing",
                job.id
            ))));
        }
        tx.commit().await?;

        Ok(result.has_hallucination)
    }

    /// Drain up to `limit` pending jobs one at a time
    ///
    /// A job that errors is logged and counted; the drain continues.
    pub async fn process_pending(
        &self,
        limit: i64,
        cancel_token: &CancellationToken,
    ) -> Result<ProcessSummary> {
        let jobs = self.drain_pending(limit).await?;
        let mut summary = ProcessSummary::default();

        for (index, job) in jobs.iter().enumerate() {
            if cancel_token.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if index > 0 && !self.settings.job_delay.is_zero() {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.settings.job_delay) => {}
                }
            }

            summary.processed += 1;
            match self.process_job(job.id).await {
                Ok(JobOutcome::Completed { has_hallucination }) => {
                    summary.completed += 1;
                    if has_hallucination {
                        summary.hallucinations += 1;
                    }
                }
                Ok(JobOutcome::Retrying { .. }) => summary.retrying += 1,
                Ok(JobOutcome::Failed { .. }) => summary.failed += 1,
                Ok(JobOutcome::NotClaimed) => summary.not_claimed += 1,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Analysis job errored");
                    summary.errors += 1;
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                completed = summary.completed,
                retrying = summary.retrying,
                failed = summary.failed,
                cancelled = summary.cancelled,
                "Drained analysis queue"
            );
        }

        Ok(summary)
    }

    /// Drain every `interval` until cancelled
    pub async fn run(self: Arc<Self>, interval: Duration, batch_size: i64, cancel_token: CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            batch_size,
            "Analysis worker started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.recover_stale(self.settings.stale_after).await {
                        tracing::error!(error = %e, "Stale job recovery failed");
                    }
                    if let Err(e) = self.process_pending(batch_size, &cancel_token).await {
                        tracing::error!(error = %e, "Analysis drain failed");
                    }
                }
            }
        }

        tracing::info!("Analysis worker stopped");
    }
}
