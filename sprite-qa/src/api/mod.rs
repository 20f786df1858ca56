//! HTTP API handlers for sprite-qa
//!
//! Thin wrappers over the services. Successful payloads carry
//! `"success": true`; errors are rendered by `ApiError`.

pub mod cleanup;
pub mod health;
pub mod jobs;
pub mod verify;

pub use cleanup::cleanup_routes;
pub use health::health_routes;
pub use jobs::job_routes;
pub use verify::verify_routes;

use axum::Json;
use serde::Serialize;

/// `{"success": true, ...payload}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

pub fn success<T: Serialize>(payload: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        payload,
    })
}
