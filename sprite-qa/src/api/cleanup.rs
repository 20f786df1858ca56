//! POST /cleanup
//!
//! Destructive modes need an explicit mode string; confirmation is up to
//! the caller.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use super::{success, Success};
use crate::error::ApiResult;
use crate::services::{run_cleanup, CleanupMode, CleanupReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub mode: String,
}

pub async fn cleanup(
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> ApiResult<Json<Success<CleanupReport>>> {
    let mode = CleanupMode::parse(&request.mode)?;
    let report = run_cleanup(&state.db, &mode).await?;
    Ok(success(report))
}

pub fn cleanup_routes() -> Router<AppState> {
    Router::new().route("/cleanup", post(cleanup))
}
