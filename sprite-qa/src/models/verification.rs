//! Fix verification outcomes and audit records
//!
//! Classification is a pure function of the original defect type and the
//! re-analysis; the verification engine only acts on its result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprite_common::{Error, Result};
use uuid::Uuid;

use super::generation::AssetKey;

/// Alignment gain (points) above which a different defect counts as progress
pub const IMPROVEMENT_THRESHOLD: f64 = 10.0;

/// Verdict of one verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    VerifiedFixed,
    StillBroken,
    Improved,
    DifferentIssue,
    NoFixAvailable,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::VerifiedFixed => "VERIFIED_FIXED",
            VerificationStatus::StillBroken => "STILL_BROKEN",
            VerificationStatus::Improved => "IMPROVED",
            VerificationStatus::DifferentIssue => "DIFFERENT_ISSUE",
            VerificationStatus::NoFixAvailable => "NO_FIX_AVAILABLE",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "VERIFIED_FIXED" => Ok(VerificationStatus::VerifiedFixed),
            "STILL_BROKEN" => Ok(VerificationStatus::StillBroken),
            "IMPROVED" => Ok(VerificationStatus::Improved),
            "DIFFERENT_ISSUE" => Ok(VerificationStatus::DifferentIssue),
            "NO_FIX_AVAILABLE" => Ok(VerificationStatus::NoFixAvailable),
            other => Err(Error::Internal(format!(
                "Unknown verification status '{}'",
                other
            ))),
        }
    }
}

/// Classify a re-analysis against the defect it was meant to fix
pub fn classify(
    original_type: Option<&str>,
    new_has_hallucination: bool,
    new_type: Option<&str>,
    alignment_delta: f64,
) -> VerificationStatus {
    if !new_has_hallucination {
        VerificationStatus::VerifiedFixed
    } else if new_type == original_type {
        VerificationStatus::StillBroken
    } else if alignment_delta > IMPROVEMENT_THRESHOLD {
        VerificationStatus::Improved
    } else {
        VerificationStatus::DifferentIssue
    }
}

/// Lookup tier that produced the representative sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Same category, subcategory, style and type
    Exact,
    /// Same category, subcategory and type
    AnyStyle,
    /// Same category and type
    Category,
    /// Any generation of the category/subcategory with a placeholder analysis
    Fallback,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::AnyStyle => "any_style",
            MatchTier::Category => "category",
            MatchTier::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "exact" => Ok(MatchTier::Exact),
            "any_style" => Ok(MatchTier::AnyStyle),
            "category" => Ok(MatchTier::Category),
            "fallback" => Ok(MatchTier::Fallback),
            other => Err(Error::Internal(format!("Unknown match tier '{}'", other))),
        }
    }
}

/// Append-only audit row for one verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub original_generation_id: String,
    pub pattern_id: Option<Uuid>,
    #[serde(flatten)]
    pub key: AssetKey,
    pub match_tier: Option<MatchTier>,
    pub verification_image_url: String,
    pub applied_fixes: Vec<String>,
    pub original_hallucination_type: Option<String>,
    pub new_has_hallucination: bool,
    pub new_hallucination_type: Option<String>,
    pub original_alignment: f64,
    pub new_alignment: f64,
    pub status: VerificationStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Per-item status within a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchItemStatus {
    VerifiedFixed,
    StillBroken,
    Improved,
    DifferentIssue,
    Skipped,
    NoFix,
    GenerationFailed,
    Error,
}

impl From<VerificationStatus> for BatchItemStatus {
    fn from(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::VerifiedFixed => BatchItemStatus::VerifiedFixed,
            VerificationStatus::StillBroken => BatchItemStatus::StillBroken,
            VerificationStatus::Improved => BatchItemStatus::Improved,
            VerificationStatus::DifferentIssue => BatchItemStatus::DifferentIssue,
            VerificationStatus::NoFixAvailable => BatchItemStatus::NoFix,
        }
    }
}
