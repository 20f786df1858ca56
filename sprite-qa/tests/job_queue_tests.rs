//! Analysis job queue and worker tests

mod helpers;

use helpers::*;
use sprite_qa::db;
use sprite_qa::models::{JobOutcome, JobStatus};
use sprite_qa::services::{AnalysisWorker, VisionError, WorkerSettings};
use sprite_qa::db::jobs::StaleRecovery;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn settings() -> WorkerSettings {
    WorkerSettings {
        max_retries: 3,
        retry_malformed: true,
        job_delay: Duration::ZERO,
        max_lock_wait_ms: 1000,
        stale_after: Duration::from_secs(600),
    }
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    let worker = AnalysisWorker::new(pool.clone(), ScriptedVision::new(vec![]), settings());

    let first = worker.enqueue("gen-1", 1).await.unwrap();
    let second = worker.enqueue("gen-1", 7).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.priority, 7);
    assert_eq!(second.status, JobStatus::Pending);
    assert_eq!(count_rows(&pool, "analysis_jobs").await, 1);
}

#[tokio::test]
async fn test_enqueue_unknown_generation() {
    let (_dir, pool) = create_test_db().await;
    let worker = AnalysisWorker::new(pool.clone(), ScriptedVision::new(vec![]), settings());

    let err = worker.enqueue("missing", 0).await.unwrap_err();
    assert!(matches!(err, sprite_common::Error::NotFound(_)));
}

#[tokio::test]
async fn test_drain_orders_by_priority_then_age() {
    let (_dir, pool) = create_test_db().await;
    for id in ["a", "b", "c"] {
        seed_generation(&pool, id, "iron sword", &sword_key()).await;
    }
    let worker = AnalysisWorker::new(pool.clone(), ScriptedVision::new(vec![]), settings());
    worker.enqueue("a", 0).await.unwrap();
    worker.enqueue("b", 5).await.unwrap();
    worker.enqueue("c", 0).await.unwrap();

    let pending = worker.drain_pending(2).await.unwrap();
    let order: Vec<&str> = pending.iter().map(|j| j.generation_id.as_str()).collect();
    assert_eq!(order, vec!["b", "a"]);
}

#[tokio::test]
async fn test_successful_job_persists_everything() {
    let (_dir, pool) = create_test_db().await;
    let key = sword_key();
    seed_generation(&pool, "gen-1", "iron sword with golden hilt", &key).await;
    let vision = ScriptedVision::new(vec![Ok(defect_result("extra_element", 40.0))]);
    let worker = AnalysisWorker::new(pool.clone(), vision.clone(), settings());
    let job = worker.enqueue("gen-1", 0).await.unwrap();

    let outcome = worker.process_job(job.id).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            has_hallucination: true
        }
    );

    let job = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    let analysis = db::analyses::get_analysis(&pool, "gen-1").await.unwrap().unwrap();
    assert_eq!(analysis.result.hallucination_type.as_deref(), Some("extra_element"));

    let patterns = db::patterns::list_fixable(&pool, "WEAPONS", Some("SWORDS"), None, 10)
        .await
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].occurrence_count, 1);
    assert_eq!(patterns[0].prevention_prompt.as_deref(), Some("no scabbard"));

    let fix_set = db::fix_sets::find_best(&pool, &key).await.unwrap().unwrap();
    assert_eq!(fix_set.avoid_keywords, vec!["scabbard"]);
    assert_eq!(fix_set.version, 1);

    assert_eq!(count_rows(&pool, "prompt_outcomes").await, 1);
    assert_eq!(vision.calls(), 1);
}

#[tokio::test]
async fn test_failures_retry_then_fail() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    let vision = ScriptedVision::new(
        (0..4)
            .map(|_| Err(VisionError::Timeout("no answer".to_string())))
            .collect(),
    );
    let worker = AnalysisWorker::new(pool.clone(), vision, settings());
    let job = worker.enqueue("gen-1", 0).await.unwrap();

    for expected in 1..=3 {
        match worker.process_job(job.id).await.unwrap() {
            JobOutcome::Retrying { retry_count, error } => {
                assert_eq!(retry_count, expected);
                assert!(error.starts_with("timeout:"), "{}", error);
            }
            other => panic!("expected retry, got {:?}", other),
        }
        let stored = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(!stored.status.is_terminal());
    }

    let outcome = worker.process_job(job.id).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { retry_count: 4, .. }));

    let stored = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.status.is_terminal());
    assert!(stored.error_message.unwrap().starts_with("timeout:"));

    // terminal jobs are not claimed again
    assert_eq!(worker.process_job(job.id).await.unwrap(), JobOutcome::NotClaimed);
}

#[tokio::test]
async fn test_malformed_response_fails_fast_when_configured() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    let vision = ScriptedVision::new(vec![Err(VisionError::Malformed("not json".to_string()))]);
    let worker = AnalysisWorker::new(
        pool.clone(),
        vision,
        WorkerSettings {
            retry_malformed: false,
            ..settings()
        },
    );
    let job = worker.enqueue("gen-1", 0).await.unwrap();

    match worker.process_job(job.id).await.unwrap() {
        JobOutcome::Failed { retry_count, error } => {
            assert_eq!(retry_count, 1);
            assert!(error.starts_with("malformed response:"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    let job = db::jobs::enqueue(&pool, "gen-1", 0).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            db::jobs::claim(&pool, job.id, 5000).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_process_pending_never_leaves_processing() {
    let (_dir, pool) = create_test_db().await;
    for id in ["a", "b", "c"] {
        seed_generation(&pool, id, "iron sword", &sword_key()).await;
    }
    let vision = ScriptedVision::new(vec![
        Ok(clean_result(85.0)),
        Err(VisionError::Network("connection reset".to_string())),
        Ok(defect_result("wrong_element", 30.0)),
    ]);
    let worker = AnalysisWorker::new(pool.clone(), vision, settings());
    for id in ["a", "b", "c"] {
        worker.enqueue(id, 0).await.unwrap();
    }

    let summary = worker
        .process_pending(10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.hallucinations, 1);
    assert_eq!(summary.retrying, 1);
    assert_eq!(
        db::jobs::count_by_status(&pool, JobStatus::Processing).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_cancelled_drain_stops_before_work() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "a", "iron sword", &sword_key()).await;
    let vision = ScriptedVision::new(vec![Ok(clean_result(85.0))]);
    let worker = AnalysisWorker::new(pool.clone(), vision.clone(), settings());
    worker.enqueue("a", 0).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let summary = worker.process_pending(10, &token).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.processed, 0);
    assert_eq!(vision.calls(), 0);
}

#[tokio::test]
async fn test_abandoned_claim_is_released_and_retried() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;

    // the attempt is dropped mid-analysis, as when a request is aborted
    let stuck = AnalysisWorker::new(pool.clone(), Arc::new(HangingVision), settings());
    let job = stuck.enqueue("gen-1", 0).await.unwrap();
    let attempt = tokio::time::timeout(Duration::from_millis(200), stuck.process_job(job.id)).await;
    assert!(attempt.is_err());
    let stored = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);

    let worker = AnalysisWorker::new(
        pool.clone(),
        ScriptedVision::new(vec![Ok(clean_result(85.0))]),
        settings(),
    );

    // a recent claim is left alone
    let recovery = worker.recover_stale(Duration::from_secs(600)).await.unwrap();
    assert_eq!(recovery, StaleRecovery::default());
    let summary = worker
        .process_pending(10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.processed, 0);

    let recovery = worker.recover_stale(Duration::ZERO).await.unwrap();
    assert_eq!(recovery, StaleRecovery { requeued: 1, failed: 0 });
    let stored = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.error_message.unwrap().starts_with("interrupted:"));

    let summary = worker
        .process_pending(10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(
        db::jobs::count_by_status(&pool, JobStatus::Processing).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_abandoned_claim_with_spent_budget_fails() {
    let (_dir, pool) = create_test_db().await;
    seed_generation(&pool, "gen-1", "iron sword", &sword_key()).await;
    let job = db::jobs::enqueue(&pool, "gen-1", 0).await.unwrap();
    assert!(db::jobs::claim(&pool, job.id, 1000).await.unwrap());
    sqlx::query("UPDATE analysis_jobs SET retry_count = 3 WHERE id = ?")
        .bind(job.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let worker = AnalysisWorker::new(pool.clone(), ScriptedVision::new(vec![]), settings());
    let recovery = worker.recover_stale(Duration::ZERO).await.unwrap();
    assert_eq!(recovery, StaleRecovery { requeued: 0, failed: 1 });

    let stored = db::jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.retry_count, 4);
}
