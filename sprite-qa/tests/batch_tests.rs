//! Batch verification tests

mod helpers;

use helpers::*;
use sprite_qa::models::{AssetKey, BatchItemStatus};
use sprite_qa::services::{run_batch, BatchRequest, VisionError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request(limit: i64) -> BatchRequest {
    BatchRequest {
        limit,
        category_id: None,
        min_occurrences: 2,
        delay: Duration::ZERO,
    }
}

/// One defective generation and three eligible patterns (5, 3 and 2
/// occurrences), plus three that must never be selected
async fn seed_candidates(pool: &sqlx::SqlitePool) -> Vec<uuid::Uuid> {
    let key = sword_key();
    seed_generation(pool, "gen-1", "iron sword", &key).await;
    seed_analysis(pool, "gen-1", &defect_result("extra_element", 40.0)).await;

    let eligible = vec![
        seed_pattern(pool, &key, "extra_element", "iron sword", 5, Some("no scabbard visible")).await,
        seed_pattern(pool, &key, "wrong_element", "iron sword", 3, Some("straight blade")).await,
        seed_pattern(pool, &key, "missing_element", "iron sword", 2, Some("golden hilt")).await,
    ];

    seed_pattern(pool, &key, "style_mismatch", "iron sword", 1, Some("exact style match")).await;
    seed_pattern(pool, &key, "extra_element", "steel sword", 9, None).await;
    let inactive = seed_pattern(pool, &key, "wrong_element", "steel sword", 8, Some("one blade")).await;
    sqlx::query("UPDATE hallucination_patterns SET is_active = 0 WHERE id = ?")
        .bind(inactive.to_string())
        .execute(pool)
        .await
        .unwrap();

    eligible
}

#[tokio::test]
async fn test_batch_processes_only_eligible_patterns() {
    let (_dir, pool) = create_test_db().await;
    let eligible = seed_candidates(&pool).await;
    let generator = FakeGenerator::working();
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new((0..3).map(|_| Ok(clean_result(85.0))).collect()),
        generator.clone(),
        None,
    );

    let report = run_batch(&verifier, &pool, &request(5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.verified, 3);
    assert!(!report.cancelled);
    let order: Vec<_> = report.results.iter().map(|r| r.pattern_id).collect();
    assert_eq!(order, eligible);
    assert_eq!(report.results[0].category, "WEAPONS/SWORDS");
    assert_eq!(generator.request_count(), 3);
}

#[tokio::test]
async fn test_batch_respects_limit() {
    let (_dir, pool) = create_test_db().await;
    let eligible = seed_candidates(&pool).await;
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new(vec![Ok(clean_result(85.0))]),
        FakeGenerator::working(),
        None,
    );

    let report = run_batch(&verifier, &pool, &request(1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.results[0].pattern_id, eligible[0]);
}

#[tokio::test]
async fn test_item_failures_are_isolated() {
    let (_dir, pool) = create_test_db().await;
    seed_candidates(&pool).await;
    // a pattern in a category with no generations at all
    seed_pattern(
        &pool,
        &AssetKey::new("ARMOR", "HELMETS", "PIXEL_ART_16"),
        "extra_element",
        "iron helmet",
        2,
        Some("no plume"),
    )
    .await;
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new(vec![
            Ok(clean_result(85.0)),
            Err(VisionError::Network("connection reset".to_string())),
            Ok(defect_result("missing_element", 35.0)),
        ]),
        FakeGenerator::working(),
        None,
    );

    let report = run_batch(&verifier, &pool, &request(10), &CancellationToken::new())
        .await
        .unwrap();

    let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            BatchItemStatus::VerifiedFixed,
            BatchItemStatus::Error,
            BatchItemStatus::StillBroken,
            BatchItemStatus::Skipped,
        ]
    );
    assert_eq!(report.summary.total, 4);
    assert_eq!(report.summary.errors, 1);
    assert_eq!(report.summary.broken, 1);
    assert_eq!(report.summary.skipped, 1);
    assert!(report.results[1].message.contains("network"));
}

#[tokio::test]
async fn test_generation_failures_are_counted_as_errors() {
    let (_dir, pool) = create_test_db().await;
    seed_candidates(&pool).await;
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new(vec![]),
        FakeGenerator::failing(),
        None,
    );

    let report = run_batch(&verifier, &pool, &request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report
        .results
        .iter()
        .all(|r| r.status == BatchItemStatus::GenerationFailed));
    assert_eq!(report.summary.errors, 3);
    assert_eq!(count_rows(&pool, "verification_records").await, 0);
}

#[tokio::test]
async fn test_category_filter() {
    let (_dir, pool) = create_test_db().await;
    seed_candidates(&pool).await;
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new(vec![]),
        FakeGenerator::working(),
        None,
    );

    let report = run_batch(
        &verifier,
        &pool,
        &BatchRequest {
            category_id: Some("ARMOR".to_string()),
            ..request(5)
        },
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.summary.total, 0);
}

#[tokio::test]
async fn test_cancelled_batch_stops_between_items() {
    let (_dir, pool) = create_test_db().await;
    seed_candidates(&pool).await;
    let generator = FakeGenerator::working();
    let verifier = build_verifier(
        &pool,
        ScriptedVision::new(vec![Ok(clean_result(85.0))]),
        generator.clone(),
        None,
    );

    let token = CancellationToken::new();
    token.cancel();
    let report = run_batch(&verifier, &pool, &request(5), &token).await.unwrap();

    assert!(report.cancelled);
    assert!(report.results.is_empty());
    assert_eq!(generator.request_count(), 0);
}
