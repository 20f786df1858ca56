//! Batch fix verification
//!
//! Runs the verification engine over the highest-impact candidate patterns
//! one at a time, pausing between items so the external services are not
//! hammered. A failing item is recorded and the batch moves on.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::fix_verifier::{FixVerifier, VerifyError, VerifyOutcome};
use crate::db;
use crate::models::{BatchItemStatus, HallucinationPattern};

/// Batch selection and pacing
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub limit: i64,
    pub category_id: Option<String>,
    pub min_occurrences: i64,
    pub delay: Duration,
}

/// Result for one pattern in a batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub pattern_id: Uuid,
    pub hallucination_type: String,
    pub category: String,
    pub status: BatchItemStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied_fixes: Vec<String>,
}

/// Tally over all items of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub verified: usize,
    pub broken: usize,
    pub improved: usize,
    pub different: usize,
    pub skipped: usize,
    pub no_fix: usize,
    /// Includes generation failures
    pub errors: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchItemResult]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };
        for item in results {
            match item.status {
                BatchItemStatus::VerifiedFixed => summary.verified += 1,
                BatchItemStatus::StillBroken => summary.broken += 1,
                BatchItemStatus::Improved => summary.improved += 1,
                BatchItemStatus::DifferentIssue => summary.different += 1,
                BatchItemStatus::Skipped => summary.skipped += 1,
                BatchItemStatus::NoFix => summary.no_fix += 1,
                BatchItemStatus::GenerationFailed | BatchItemStatus::Error => summary.errors += 1,
            }
        }
        summary
    }
}

/// Completed (or cancelled) batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchItemResult>,
    pub summary: BatchSummary,
    pub cancelled: bool,
}

fn item_result(pattern: &HallucinationPattern, outcome: Result<VerifyOutcome, VerifyError>) -> BatchItemResult {
    let (status, message, applied_fixes) = match outcome {
        Ok(VerifyOutcome::Completed(report)) => (
            BatchItemStatus::from(report.status),
            report.message,
            report.record.applied_fixes,
        ),
        Ok(VerifyOutcome::SampleNotFound { .. }) => (
            BatchItemStatus::Skipped,
            "No original generation found to test against".to_string(),
            Vec::new(),
        ),
        Ok(VerifyOutcome::NoFixAvailable { .. }) => (
            BatchItemStatus::NoFix,
            "No fixes were applied".to_string(),
            Vec::new(),
        ),
        Err(VerifyError::Generation(e)) => {
            tracing::error!(pattern_id = %pattern.id, error = %e, "Verification image generation failed");
            (BatchItemStatus::GenerationFailed, e.to_string(), Vec::new())
        }
        Err(e) => {
            tracing::error!(pattern_id = %pattern.id, error = %e, "Pattern verification failed");
            (BatchItemStatus::Error, e.to_string(), Vec::new())
        }
    };

    BatchItemResult {
        pattern_id: pattern.id,
        hallucination_type: pattern.hallucination_type.clone(),
        category: format!("{}/{}", pattern.key.category_id, pattern.key.subcategory_id),
        status,
        message,
        applied_fixes,
    }
}

/// Verify up to `request.limit` candidate patterns sequentially
///
/// Only candidate selection can fail the whole batch; per-item failures are
/// reported in the results.
pub async fn run_batch(
    verifier: &FixVerifier,
    pool: &sqlx::SqlitePool,
    request: &BatchRequest,
    cancel_token: &CancellationToken,
) -> sprite_common::Result<BatchReport> {
    let patterns = db::patterns::list_batch_candidates(
        pool,
        request.min_occurrences,
        request.category_id.as_deref(),
        request.limit,
    )
    .await?;

    tracing::info!(
        candidates = patterns.len(),
        limit = request.limit,
        min_occurrences = request.min_occurrences,
        "Starting batch verification"
    );

    let mut results = Vec::with_capacity(patterns.len());
    let mut cancelled = false;

    for (index, pattern) in patterns.iter().enumerate() {
        if cancel_token.is_cancelled() {
            tracing::info!(processed = index, "Batch verification cancelled");
            cancelled = true;
            break;
        }
        if index > 0 && !request.delay.is_zero() {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!(processed = index, "Batch verification cancelled");
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(request.delay) => {}
            }
        }

        tracing::debug!(
            pattern_id = %pattern.id,
            hallucination_type = %pattern.hallucination_type,
            key = %pattern.key,
            "Verifying pattern"
        );
        let outcome = verifier.verify_loaded_pattern(pattern).await;
        results.push(item_result(pattern, outcome));
    }

    let summary = BatchSummary::from_results(&results);
    tracing::info!(
        total = summary.total,
        verified = summary.verified,
        broken = summary.broken,
        errors = summary.errors,
        "Batch verification finished"
    );

    Ok(BatchReport {
        results,
        summary,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: BatchItemStatus) -> BatchItemResult {
        BatchItemResult {
            pattern_id: Uuid::new_v4(),
            hallucination_type: "extra_element".to_string(),
            category: "WEAPONS/SWORDS".to_string(),
            status,
            message: String::new(),
            applied_fixes: Vec::new(),
        }
    }

    #[test]
    fn test_summary_tally() {
        let results = vec![
            item(BatchItemStatus::VerifiedFixed),
            item(BatchItemStatus::VerifiedFixed),
            item(BatchItemStatus::StillBroken),
            item(BatchItemStatus::GenerationFailed),
            item(BatchItemStatus::Error),
            item(BatchItemStatus::Skipped),
            item(BatchItemStatus::NoFix),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total, 7);
        assert_eq!(summary.verified, 2);
        assert_eq!(summary.broken, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.no_fix, 1);
        assert_eq!(summary.improved, 0);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let json = serde_json::to_value(BatchSummary::default()).unwrap();
        assert!(json.get("noFix").is_some());
    }
}
