//! Learned hallucination patterns and outcome aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::generation::AssetKey;
use super::verification::VerificationStatus;

/// A recurring defect for one asset key and trigger-keyword set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HallucinationPattern {
    pub id: Uuid,
    #[serde(flatten)]
    pub key: AssetKey,
    pub hallucination_type: String,
    pub trigger_keywords: Vec<String>,
    pub occurrence_count: i64,
    pub prevention_prompt: Option<String>,
    pub is_active: bool,
    pub last_verification_status: Option<VerificationStatus>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Classification of one analysis for outcome aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Positive,
    Negative,
    Neutral,
}

impl OutcomeClass {
    pub fn classify(prompt_alignment: f64, has_hallucination: bool) -> Self {
        if prompt_alignment >= 70.0 && !has_hallucination {
            OutcomeClass::Positive
        } else if prompt_alignment < 50.0 || has_hallucination {
            OutcomeClass::Negative
        } else {
            OutcomeClass::Neutral
        }
    }
}

/// Running statistics for one canonical prompt shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutcomePattern {
    pub id: Uuid,
    #[serde(flatten)]
    pub key: AssetKey,
    pub prompt_pattern: String,
    pub total_count: i64,
    pub positive_count: i64,
    pub negative_count: i64,
    pub avg_alignment: f64,
    pub best_variant: Option<String>,
    pub best_alignment: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Accumulated keyword fixes for one asset key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedFixSet {
    pub id: Uuid,
    #[serde(flatten)]
    pub key: AssetKey,
    pub prompt_template: String,
    pub required_keywords: Vec<String>,
    pub avoid_keywords: Vec<String>,
    pub version: i64,
    pub confidence_score: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_class_boundaries() {
        assert_eq!(OutcomeClass::classify(70.0, false), OutcomeClass::Positive);
        assert_eq!(OutcomeClass::classify(95.0, true), OutcomeClass::Negative);
        assert_eq!(OutcomeClass::classify(49.9, false), OutcomeClass::Negative);
        assert_eq!(OutcomeClass::classify(50.0, false), OutcomeClass::Neutral);
        assert_eq!(OutcomeClass::classify(69.9, false), OutcomeClass::Neutral);
    }
}
