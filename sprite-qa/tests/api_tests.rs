//! HTTP API tests driven through the router

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sprite_qa::services::{AnalysisWorker, WorkerSettings};
use sprite_qa::{AppState, BatchDefaults};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

async fn create_test_app(vision: Arc<ScriptedVision>) -> (Router, sqlx::SqlitePool, TempDir) {
    let (dir, pool) = create_test_db().await;
    let worker = Arc::new(AnalysisWorker::new(
        pool.clone(),
        vision.clone(),
        WorkerSettings {
            job_delay: Duration::ZERO,
            ..WorkerSettings::default()
        },
    ));
    let verifier = Arc::new(build_verifier(&pool, vision, FakeGenerator::working(), None));
    let state = AppState::new(
        pool.clone(),
        worker,
        verifier,
        BatchDefaults {
            delay: Duration::ZERO,
            ..BatchDefaults::default()
        },
        10,
        CancellationToken::new(),
    );
    (sprite_qa::build_router(state), pool, dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sprite-qa");
}

#[tokio::test]
async fn test_enqueue_and_process() {
    let vision = ScriptedVision::new(vec![Ok(defect_result("extra_element", 40.0))]);
    let (app, pool, _dir) = create_test_app(vision).await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;

    let (status, body) = send(&app, "POST", "/jobs", Some(json!({"generationId": "gen-1", "priority": 2}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["job"]["status"], "pending");
    assert_eq!(body["job"]["priority"], 2);

    let (status, body) = send(&app, "POST", "/jobs/process", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["completed"], 1);
    assert_eq!(body["summary"]["hallucinations"], 1);

    let (status, body) = send(&app, "GET", "/jobs/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalAnalyzed"], 1);
    assert_eq!(body["stats"]["hallucinationRate"], 100.0);
    assert_eq!(body["stats"]["topHallucinationTypes"][0]["hallucinationType"], "extra_element");
}

#[tokio::test]
async fn test_enqueue_unknown_generation_is_404() {
    let (app, _pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;

    let (status, body) = send(&app, "POST", "/jobs", Some(json!({"generationId": "nope"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_process_limit_validation() {
    let (app, _pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;

    let (status, body) = send(&app, "POST", "/jobs/process", Some(json!({"limit": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_verify_pattern_endpoint() {
    let vision = ScriptedVision::new(vec![Ok(clean_result(85.0))]);
    let (app, pool, _dir) = create_test_app(vision).await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    seed_analysis(&pool, "gen-1", &defect_result("extra_element", 40.0)).await;
    let pattern_id =
        seed_pattern(&pool, &sword_key(), "extra_element", "iron sword", 5, Some("no scabbard visible")).await;

    let (status, body) = send(&app, "POST", "/verify", Some(json!({"patternId": pattern_id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"], "completed");
    assert_eq!(body["status"], "VERIFIED_FIXED");

    let (status, body) = send(&app, "GET", "/verify/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["verifiedFixed"], 1);
    assert_eq!(body["stats"]["fixSuccessRate"], 100.0);
    assert_eq!(body["stats"]["activePatterns"], 0);
    assert_eq!(body["stats"]["recent"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_verify_requires_exactly_one_target() {
    let (app, _pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;

    let (status, _) = send(&app, "POST", "/verify", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let both = json!({"patternId": uuid::Uuid::new_v4(), "generationId": "gen-1"});
    let (status, _) = send(&app, "POST", "/verify", Some(both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/verify", Some(json!({"patternId": uuid::Uuid::new_v4()}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_batch_endpoint_with_no_candidates() {
    let (app, _pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;

    let (status, body) = send(&app, "POST", "/verify/batch", Some(json!({"limit": 5}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["total"], 0);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cleanup_endpoint() {
    let (app, pool, _dir) = create_test_app(ScriptedVision::new(vec![])).await;
    seed_pattern(&pool, &sword_key(), "extra_element", "iron sword", 2, None).await;

    let (status, body) = send(&app, "POST", "/cleanup", Some(json!({"mode": "everything"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(&app, "POST", "/cleanup", Some(json!({"mode": "reset_all"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "reset_all");
    assert_eq!(body["deletedPatterns"], 1);
}
