//! Analysis job endpoints
//!
//! POST /jobs, POST /jobs/process, POST /jobs/:id/process, GET /jobs/stats

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{success, Success};
use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisJob, JobOutcome};
use crate::services::stats::{self, AnalysisStats};
use crate::services::ProcessSummary;
use crate::AppState;

/// POST /jobs request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub generation_id: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job: AnalysisJob,
}

/// POST /jobs/process request
#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub summary: ProcessSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJobResponse {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: AnalysisStats,
}

/// POST /jobs
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<Json<Success<EnqueueResponse>>> {
    let generation_id = request.generation_id.trim();
    if generation_id.is_empty() {
        return Err(ApiError::BadRequest("generationId is required".to_string()));
    }

    let job = state.worker.enqueue(generation_id, request.priority).await?;
    Ok(success(EnqueueResponse { job }))
}

/// POST /jobs/process
pub async fn process_jobs(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<Success<ProcessResponse>>> {
    let limit = request.limit.unwrap_or(state.drain_limit);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and 100, got {}",
            limit
        )));
    }

    let summary = state.worker.process_pending(limit, &state.shutdown).await?;
    Ok(success(ProcessResponse { summary }))
}

/// POST /jobs/:id/process
pub async fn process_one(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Success<ProcessJobResponse>>> {
    let outcome = state.worker.process_job(job_id).await?;
    Ok(success(ProcessJobResponse { job_id, outcome }))
}

/// GET /jobs/stats
pub async fn job_stats(State(state): State<AppState>) -> ApiResult<Json<Success<StatsResponse>>> {
    let stats = stats::analysis_stats(&state.db).await?;
    Ok(success(StatsResponse { stats }))
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(enqueue_job))
        .route("/jobs/process", post(process_jobs))
        .route("/jobs/:id/process", post(process_one))
        .route("/jobs/stats", get(job_stats))
}
