//! Analysis job lifecycle
//!
//! A job moves pending → processing → {completed | pending (retry) | failed}.
//! Nothing ever moves back to processing except through a fresh claim of a
//! pending job, and completed/failed are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprite_common::{Error, Result};
use uuid::Uuid;

/// Analysis job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Internal(format!("Unknown job status '{}'", other))),
        }
    }

    /// Whether `self -> next` is a legal lifecycle edge
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Pending)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One analysis request per generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub generation_id: String,
    pub status: JobStatus,
    pub priority: i64,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Result of `process_job` for one job id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Analysis persisted, job completed
    Completed { has_hallucination: bool },
    /// Attempt failed, job back to pending
    Retrying { retry_count: i64, error: String },
    /// Attempt failed with the retry budget exhausted
    Failed { retry_count: i64, error: String },
    /// Another worker owns the job, or it is not pending
    NotClaimed,
}
