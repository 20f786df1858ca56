//! Fix verification endpoints
//!
//! POST /verify, POST /verify/batch, GET /verify/stats

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{success, Success};
use crate::error::{ApiError, ApiResult};
use crate::services::stats::{self, VerificationStats};
use crate::services::{run_batch, BatchReport, BatchRequest, VerifyOutcome};
use crate::AppState;

const DEFAULT_RECENT: i64 = 10;

/// POST /verify request; exactly one target
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub pattern_id: Option<Uuid>,
    pub generation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchVerifyRequest {
    pub limit: Option<i64>,
    pub category_id: Option<String>,
    pub min_occurrences: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub recent: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: VerificationStats,
}

/// POST /verify
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<Success<VerifyOutcome>>> {
    let outcome = match (request.pattern_id, request.generation_id) {
        (Some(pattern_id), None) => state.verifier.verify_pattern(pattern_id).await?,
        (None, Some(generation_id)) => state.verifier.verify_generation(&generation_id).await?,
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of patternId or generationId".to_string(),
            ))
        }
    };
    Ok(success(outcome))
}

/// POST /verify/batch
pub async fn verify_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchVerifyRequest>,
) -> ApiResult<Json<Success<BatchReport>>> {
    let limit = request.limit.unwrap_or(state.batch.limit);
    if !(1..=50).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and 50, got {}",
            limit
        )));
    }

    let batch = BatchRequest {
        limit,
        category_id: request.category_id.filter(|c| !c.trim().is_empty()),
        min_occurrences: request
            .min_occurrences
            .unwrap_or(state.batch.min_occurrences),
        delay: state.batch.delay,
    };

    let report = run_batch(&state.verifier, &state.db, &batch, &state.shutdown).await?;
    Ok(success(report))
}

/// GET /verify/stats
pub async fn verification_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<Success<StatsResponse>>> {
    let recent = query.recent.unwrap_or(DEFAULT_RECENT).clamp(0, 100);
    let stats = stats::verification_stats(&state.db, recent).await?;
    Ok(success(StatsResponse { stats }))
}

pub fn verify_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify))
        .route("/verify/batch", post(verify_batch))
        .route("/verify/stats", get(verification_stats))
}
