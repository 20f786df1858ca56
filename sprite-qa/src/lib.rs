//! sprite-qa library interface
//!
//! Quality feedback loop for generated sprite assets: analysis job queue,
//! hallucination pattern learning, fix verification and cleanup. Exposed as
//! a library so integration tests can drive the services and the router
//! directly.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{AnalysisWorker, FixVerifier};

/// Defaults applied to batch verification requests
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub limit: i64,
    pub min_occurrences: i64,
    pub delay: Duration,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            limit: 5,
            min_occurrences: 2,
            delay: Duration::from_secs(2),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub worker: Arc<AnalysisWorker>,
    pub verifier: Arc<FixVerifier>,
    pub batch: BatchDefaults,
    /// Jobs drained per POST /jobs/process without an explicit limit
    pub drain_limit: i64,
    /// Cancelled on shutdown; long loops check it between items
    pub shutdown: CancellationToken,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        worker: Arc<AnalysisWorker>,
        verifier: Arc<FixVerifier>,
        batch: BatchDefaults,
        drain_limit: i64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            worker,
            verifier,
            batch,
            drain_limit,
            shutdown,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::verify_routes())
        .merge(api::cleanup_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
