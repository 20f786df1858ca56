//! Cleanup and reset tests

mod helpers;

use helpers::*;
use sprite_qa::db;
use sprite_qa::services::fix_learner::learn_from_observation;
use sprite_qa::services::outcome_aggregator::record_outcome;
use sprite_qa::services::{run_cleanup, CleanupMode};
use uuid::Uuid;

async fn flagged_analyses(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM image_analyses WHERE has_hallucination = 1")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn set_inactive(pool: &sqlx::SqlitePool, id: Uuid) {
    sqlx::query("UPDATE hallucination_patterns SET is_active = 0 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

/// A verified-fixed extra_element pattern, an unverified inactive
/// wrong_element pattern, an active style_mismatch pattern, an outcome
/// aggregate and a fix set with keywords
async fn seed_learned_state(pool: &sqlx::SqlitePool) -> (Uuid, Uuid, Uuid) {
    let key = sword_key();
    seed_generation(pool, "gen-1", "iron sword", &key).await;
    seed_analysis(pool, "gen-1", &defect_result("extra_element", 40.0)).await;
    seed_generation(pool, "gen-2", "bronze sword", &key).await;
    seed_analysis(pool, "gen-2", &defect_result("wrong_element", 45.0)).await;

    let fixed = seed_pattern(pool, &key, "extra_element", "iron sword", 4, Some("no scabbard visible")).await;
    let verifier = build_verifier(
        pool,
        ScriptedVision::new(vec![Ok(clean_result(88.0))]),
        FakeGenerator::working(),
        None,
    );
    verifier.verify_pattern(fixed).await.unwrap();

    let stale = seed_pattern(pool, &key, "wrong_element", "bronze sword", 2, Some("straight blade")).await;
    set_inactive(pool, stale).await;
    let active = seed_pattern(pool, &key, "style_mismatch", "iron sword", 2, Some("exact style match")).await;

    let mut conn = pool.acquire().await.unwrap();
    record_outcome(&mut conn, &key, "iron sword", &defect_result("extra_element", 40.0))
        .await
        .unwrap();
    learn_from_observation(
        &mut conn,
        &key,
        "extra_element",
        Some("no scabbard visible"),
        &[],
        &["scabbard".to_string()],
    )
    .await
    .unwrap();

    (fixed, stale, active)
}

#[tokio::test]
async fn test_verified_only_removes_fixed_patterns_and_resolves_analyses() {
    let (_dir, pool) = create_test_db().await;
    let (fixed, stale, active) = seed_learned_state(&pool).await;

    let report = run_cleanup(&pool, &CleanupMode::VerifiedOnly).await.unwrap();
    assert_eq!(report.deleted_patterns, 1);
    assert_eq!(report.cleared_analyses, 1);

    assert!(db::patterns::get_pattern(&pool, fixed).await.unwrap().is_none());
    assert!(db::patterns::get_pattern(&pool, stale).await.unwrap().is_some());
    assert!(db::patterns::get_pattern(&pool, active).await.unwrap().is_some());

    // the row is kept, only the flag is cleared
    let analysis = db::analyses::get_analysis(&pool, "gen-1").await.unwrap().unwrap();
    assert!(!analysis.result.has_hallucination);
    assert_eq!(analysis.result.hallucination_type, None);
    assert_eq!(flagged_analyses(&pool).await, 1);

    // history survives
    assert_eq!(count_rows(&pool, "verification_records").await, 1);

    let again = run_cleanup(&pool, &CleanupMode::VerifiedOnly).await.unwrap();
    assert_eq!(again.deleted_patterns, 0);
    assert_eq!(again.cleared_analyses, 0);
}

#[tokio::test]
async fn test_all_inactive_ignores_verification_history() {
    let (_dir, pool) = create_test_db().await;
    let (fixed, stale, active) = seed_learned_state(&pool).await;

    let report = run_cleanup(&pool, &CleanupMode::AllInactive).await.unwrap();
    assert_eq!(report.deleted_patterns, 2);
    assert!(db::patterns::get_pattern(&pool, fixed).await.unwrap().is_none());
    assert!(db::patterns::get_pattern(&pool, stale).await.unwrap().is_none());
    assert!(db::patterns::get_pattern(&pool, active).await.unwrap().is_some());
    assert_eq!(flagged_analyses(&pool).await, 2);
}

#[tokio::test]
async fn test_type_reset_forgets_one_type() {
    let (_dir, pool) = create_test_db().await;
    let (fixed, stale, active) = seed_learned_state(&pool).await;

    let mode = CleanupMode::parse("reset_type:extra_element").unwrap();
    let report = run_cleanup(&pool, &mode).await.unwrap();
    assert_eq!(report.mode, "reset_type:extra_element");
    assert_eq!(report.deleted_patterns, 1);
    assert_eq!(report.deleted_verifications, 1);
    assert_eq!(report.cleared_fix_sets, 1);

    assert!(db::patterns::get_pattern(&pool, fixed).await.unwrap().is_none());
    assert!(db::patterns::get_pattern(&pool, stale).await.unwrap().is_some());
    assert!(db::patterns::get_pattern(&pool, active).await.unwrap().is_some());

    let fix_set = db::fix_sets::find_best(&pool, &sword_key()).await.unwrap().unwrap();
    assert!(fix_set.required_keywords.is_empty());
    assert!(fix_set.avoid_keywords.is_empty());
}

#[tokio::test]
async fn test_style_mismatch_alias() {
    let (_dir, pool) = create_test_db().await;
    let (_, _, active) = seed_learned_state(&pool).await;

    let mode = CleanupMode::parse("reset_style_mismatch").unwrap();
    let report = run_cleanup(&pool, &mode).await.unwrap();
    assert_eq!(report.deleted_patterns, 1);
    assert!(db::patterns::get_pattern(&pool, active).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reset_all_wipes_learned_state() {
    let (_dir, pool) = create_test_db().await;
    seed_learned_state(&pool).await;

    let report = run_cleanup(&pool, &CleanupMode::ResetAll).await.unwrap();
    assert_eq!(report.deleted_patterns, 3);
    assert_eq!(report.deleted_verifications, 1);
    assert_eq!(report.deleted_outcomes, 1);

    assert_eq!(count_rows(&pool, "hallucination_patterns").await, 0);
    assert_eq!(count_rows(&pool, "verification_records").await, 0);
    assert_eq!(count_rows(&pool, "prompt_outcomes").await, 0);
    assert_eq!(count_rows(&pool, "learned_fix_sets").await, 0);
    assert_eq!(flagged_analyses(&pool).await, 0);
    assert_eq!(count_rows(&pool, "image_analyses").await, 2);
}

#[tokio::test]
async fn test_reset_all_is_atomic() {
    let (_dir, pool) = create_test_db().await;
    seed_learned_state(&pool).await;

    // fail part-way, after records and patterns were already deleted
    sqlx::query(
        r#"
        CREATE TRIGGER fail_outcome_delete BEFORE DELETE ON prompt_outcomes
        BEGIN
            SELECT RAISE(ABORT, 'simulated failure');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = run_cleanup(&pool, &CleanupMode::ResetAll).await;
    assert!(result.is_err());

    assert_eq!(count_rows(&pool, "hallucination_patterns").await, 3);
    assert_eq!(count_rows(&pool, "verification_records").await, 1);
    assert_eq!(count_rows(&pool, "prompt_outcomes").await, 1);
    assert_eq!(flagged_analyses(&pool).await, 2);
}
