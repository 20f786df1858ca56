//! Cleanup and reset of learned quality state
//!
//! Each mode runs inside a single transaction, so a failure part-way leaves
//! the previous state untouched. Running a mode twice is harmless.

use serde::Serialize;
use sprite_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db;
use crate::models::hallucination_type;
use crate::utils::begin_monitored;

const RESET_TYPE_PREFIX: &str = "reset_type:";

/// Selectivity of a cleanup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupMode {
    /// Delete inactive patterns whose type/key has a verified fix, and mark
    /// the matching analyses resolved
    VerifiedOnly,
    /// Delete every inactive pattern
    AllInactive,
    /// Forget everything learned about one hallucination type
    ResetType(String),
    /// Wipe all learned state
    ResetAll,
}

impl CleanupMode {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value {
            "verified_only" => Ok(CleanupMode::VerifiedOnly),
            "all_inactive" => Ok(CleanupMode::AllInactive),
            "reset_all" => Ok(CleanupMode::ResetAll),
            "reset_style_mismatch" => Ok(CleanupMode::ResetType(
                hallucination_type::STYLE_MISMATCH.to_string(),
            )),
            _ => match value.strip_prefix(RESET_TYPE_PREFIX).map(str::trim) {
                Some(kind) if !kind.is_empty() => Ok(CleanupMode::ResetType(kind.to_string())),
                _ => Err(Error::InvalidInput(format!("Unknown cleanup mode: {}", value))),
            },
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            CleanupMode::VerifiedOnly => "verified_only".to_string(),
            CleanupMode::AllInactive => "all_inactive".to_string(),
            CleanupMode::ResetType(kind) => format!("{}{}", RESET_TYPE_PREFIX, kind),
            CleanupMode::ResetAll => "reset_all".to_string(),
        }
    }
}

/// Row counts touched by a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub mode: String,
    pub deleted_patterns: u64,
    pub cleared_analyses: u64,
    pub deleted_verifications: u64,
    pub deleted_outcomes: u64,
    pub deleted_fix_sets: u64,
    pub cleared_fix_sets: u64,
}

/// Run one cleanup mode
pub async fn run_cleanup(pool: &SqlitePool, mode: &CleanupMode) -> Result<CleanupReport> {
    let mut report = CleanupReport {
        mode: mode.as_string(),
        ..Default::default()
    };

    let mut tx = begin_monitored(pool, "cleanup::run_cleanup").await?;
    match mode {
        CleanupMode::VerifiedOnly => {
            let verified = db::verifications::verified_fixed_keys(tx.conn()).await?;
            let mut resolved_types: Vec<&str> = Vec::new();
            for (kind, key) in &verified {
                report.deleted_patterns +=
                    db::patterns::delete_inactive_matching(tx.conn(), key, kind).await?;
                if !resolved_types.contains(&kind.as_str()) {
                    resolved_types.push(kind);
                }
            }
            for kind in resolved_types {
                report.cleared_analyses += db::analyses::resolve_type(tx.conn(), kind).await?;
            }
        }
        CleanupMode::AllInactive => {
            report.deleted_patterns = db::patterns::delete_inactive(tx.conn()).await?;
        }
        CleanupMode::ResetType(kind) => {
            report.deleted_patterns = db::patterns::delete_by_type(tx.conn(), kind).await?;
            report.deleted_verifications =
                db::verifications::delete_by_type(tx.conn(), kind).await?;
            report.cleared_fix_sets = db::fix_sets::clear_keywords(tx.conn()).await?;
        }
        CleanupMode::ResetAll => {
            report.deleted_verifications = db::verifications::delete_all(tx.conn()).await?;
            report.deleted_patterns = db::patterns::delete_all(tx.conn()).await?;
            report.deleted_outcomes = db::outcomes::delete_all(tx.conn()).await?;
            report.deleted_fix_sets = db::fix_sets::delete_all(tx.conn()).await?;
            report.cleared_analyses = db::analyses::clear_all_flags(tx.conn()).await?;
        }
    }
    tx.commit().await?;

    tracing::info!(
        mode = %report.mode,
        deleted_patterns = report.deleted_patterns,
        cleared_analyses = report.cleared_analyses,
        deleted_verifications = report.deleted_verifications,
        deleted_outcomes = report.deleted_outcomes,
        "Cleanup complete"
    );

    Ok(report)
}
