//! Reporting over analyses and verifications

use serde::Serialize;
use sprite_common::Result;
use sqlx::SqlitePool;

use crate::db;
use crate::models::{JobStatus, VerificationRecord, VerificationStatus};

const TOP_TYPES: i64 = 5;

/// Coarse quality rating for a set of analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityHealth {
    Good,
    Warning,
    Critical,
}

impl QualityHealth {
    pub fn from_metrics(avg_alignment: f64, hallucination_rate: f64) -> Self {
        if avg_alignment >= 75.0 && hallucination_rate < 10.0 {
            QualityHealth::Good
        } else if avg_alignment >= 50.0 && hallucination_rate < 30.0 {
            QualityHealth::Warning
        } else {
            QualityHealth::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub hallucination_type: String,
    pub occurrences: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_analyzed: i64,
    pub pending_jobs: i64,
    pub failed_jobs: i64,
    pub avg_quality: f64,
    pub avg_alignment: f64,
    /// Percent of analyses with a hallucination
    pub hallucination_rate: f64,
    pub health: Option<QualityHealth>,
    pub top_hallucination_types: Vec<TypeCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub total_patterns: i64,
    pub active_patterns: i64,
    pub verified_fixed: i64,
    pub still_broken: i64,
    pub pending_verification: i64,
    /// Percent; absent until at least one clean verdict exists
    pub fix_success_rate: Option<f64>,
    pub recent: Vec<VerificationRecord>,
}

/// `fixed / (fixed + broken)` as a rounded percentage
pub fn success_rate(verified_fixed: i64, still_broken: i64) -> Option<f64> {
    let decided = verified_fixed + still_broken;
    (decided > 0).then(|| (verified_fixed as f64 / decided as f64 * 100.0).round())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub async fn analysis_stats(pool: &SqlitePool) -> Result<AnalysisStats> {
    let totals = db::analyses::totals(pool).await?;
    let pending_jobs = db::jobs::count_by_status(pool, JobStatus::Pending).await?;
    let failed_jobs = db::jobs::count_by_status(pool, JobStatus::Failed).await?;
    let top = db::patterns::top_types(pool, TOP_TYPES).await?;

    let hallucination_rate = if totals.total > 0 {
        round1(totals.with_hallucination as f64 / totals.total as f64 * 100.0)
    } else {
        0.0
    };
    let avg_alignment = round1(totals.avg_alignment);

    Ok(AnalysisStats {
        total_analyzed: totals.total,
        pending_jobs,
        failed_jobs,
        avg_quality: round1(totals.avg_quality),
        avg_alignment,
        hallucination_rate,
        health: (totals.total > 0)
            .then(|| QualityHealth::from_metrics(avg_alignment, hallucination_rate)),
        top_hallucination_types: top
            .into_iter()
            .map(|(hallucination_type, occurrences)| TypeCount {
                hallucination_type,
                occurrences,
            })
            .collect(),
    })
}

pub async fn verification_stats(pool: &SqlitePool, recent_limit: i64) -> Result<VerificationStats> {
    let patterns = db::patterns::counts(pool).await?;
    let verified_fixed =
        db::verifications::count_by_status(pool, VerificationStatus::VerifiedFixed).await?;
    let still_broken =
        db::verifications::count_by_status(pool, VerificationStatus::StillBroken).await?;
    let recent = db::verifications::list_recent(pool, recent_limit).await?;

    Ok(VerificationStats {
        total_patterns: patterns.total,
        active_patterns: patterns.active,
        verified_fixed,
        still_broken,
        pending_verification: patterns.pending_verification,
        fix_success_rate: success_rate(verified_fixed, still_broken),
        recent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_excludes_undecided() {
        assert_eq!(success_rate(0, 0), None);
        assert_eq!(success_rate(3, 1), Some(75.0));
        assert_eq!(success_rate(1, 2), Some(33.0));
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(QualityHealth::from_metrics(80.0, 5.0), QualityHealth::Good);
        assert_eq!(QualityHealth::from_metrics(80.0, 15.0), QualityHealth::Warning);
        assert_eq!(QualityHealth::from_metrics(45.0, 5.0), QualityHealth::Critical);
    }
}
