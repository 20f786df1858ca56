//! Vision analysis results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hallucination type names emitted by the analyzer
pub mod hallucination_type {
    pub const MISSING_ELEMENT: &str = "missing_element";
    pub const WRONG_ELEMENT: &str = "wrong_element";
    pub const EXTRA_ELEMENT: &str = "extra_element";
    pub const STYLE_MISMATCH: &str = "style_mismatch";
}

/// Structured output of one vision analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub detected_objects: Vec<String>,
    pub detected_style: String,
    pub detected_colors: Vec<String>,
    pub detected_mood: String,
    /// 0-100
    pub quality_score: f64,
    /// 0-100
    pub style_accuracy: f64,
    /// 0-100
    pub prompt_alignment: f64,
    /// 0-100
    pub confidence: f64,
    pub has_hallucination: bool,
    pub hallucination_type: Option<String>,
    pub hallucination_details: Option<String>,
    pub requested_elements: Vec<String>,
    pub missing_elements: Vec<String>,
    pub extra_elements: Vec<String>,
    pub suggested_fix: Option<String>,
    /// Analyzer payload as received
    pub raw: serde_json::Value,
}

impl AnalysisResult {
    /// Placeholder used when a fix is tested against a sample that has no
    /// real defect history
    pub fn synthetic(hallucination_type: Option<String>) -> Self {
        Self {
            detected_objects: Vec::new(),
            detected_style: "unknown".to_string(),
            detected_colors: Vec::new(),
            detected_mood: "neutral".to_string(),
            quality_score: 50.0,
            style_accuracy: 50.0,
            prompt_alignment: 50.0,
            confidence: 0.0,
            has_hallucination: true,
            hallucination_type,
            hallucination_details: None,
            requested_elements: Vec::new(),
            missing_elements: Vec::new(),
            extra_elements: Vec::new(),
            suggested_fix: None,
            raw: serde_json::Value::Null,
        }
    }
}

/// Persisted analysis, one per generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub id: Uuid,
    pub generation_id: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
