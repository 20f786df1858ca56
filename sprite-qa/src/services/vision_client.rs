//! Vision analysis service client
//!
//! Sends an image URL and its request context to the analyzer and turns the
//! analyzer's JSON (possibly wrapped in a markdown fence) into an
//! `AnalysisResult`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use super::rate_limiter::RateLimiter;
use crate::models::{AnalysisResult, AssetKey};

const USER_AGENT: &str = concat!("sprite-qa/", env!("CARGO_PKG_VERSION"));

/// Vision client errors
///
/// Display text starts with the failure class; it is stored verbatim as a
/// job's error message.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("network: {0}")]
    Network(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("api error {0}: {1}")]
    Api(u16, String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl VisionError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, VisionError::Malformed(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VisionError::Timeout(err.to_string())
        } else {
            VisionError::Network(err.to_string())
        }
    }
}

/// Image analysis seam
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        key: &AssetKey,
    ) -> Result<AnalysisResult, VisionError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    detected: Option<RawDetected>,
    scores: Option<RawScores>,
    hallucination: Option<RawHallucination>,
    elements: Option<RawElements>,
    suggestion: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDetected {
    objects: Option<Vec<String>>,
    style: Option<String>,
    colors: Option<Vec<String>>,
    mood: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawScores {
    quality: Option<f64>,
    style_accuracy: Option<f64>,
    prompt_alignment: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHallucination {
    detected: Option<bool>,
    #[serde(rename = "type")]
    kind: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawElements {
    requested: Option<Vec<String>>,
    missing: Option<Vec<String>>,
    extra: Option<Vec<String>>,
}

/// Remove a surrounding ```json ... ``` fence if present
fn strip_fence(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("```") {
        if let Some(newline) = body.find('\n') {
            body = &body[newline + 1..];
        }
        if let Some(stripped) = body.trim_end().strip_suffix("```") {
            body = stripped;
        }
        body = body.trim();
    }
    body
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.eq_ignore_ascii_case("null")
    })
}

/// Parse an analyzer reply into an `AnalysisResult`
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, VisionError> {
    let body = strip_fence(text);
    let raw_value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| VisionError::Malformed(e.to_string()))?;
    if !raw_value.is_object() {
        return Err(VisionError::Malformed("expected a JSON object".to_string()));
    }
    let raw: RawAnalysis = serde_json::from_value(raw_value.clone())
        .map_err(|e| VisionError::Malformed(e.to_string()))?;

    let detected = raw.detected.unwrap_or_default();
    let scores = raw.scores.unwrap_or_default();
    let hallucination = raw.hallucination.unwrap_or_default();
    let elements = raw.elements.unwrap_or_default();

    Ok(AnalysisResult {
        detected_objects: detected.objects.unwrap_or_default(),
        detected_style: non_empty(detected.style).unwrap_or_else(|| "unknown".to_string()),
        detected_colors: detected.colors.unwrap_or_default(),
        detected_mood: non_empty(detected.mood).unwrap_or_else(|| "neutral".to_string()),
        quality_score: scores.quality.unwrap_or(0.0),
        style_accuracy: scores.style_accuracy.unwrap_or(0.0),
        prompt_alignment: scores.prompt_alignment.unwrap_or(0.0),
        confidence: raw.confidence.unwrap_or(0.0),
        has_hallucination: hallucination.detected.unwrap_or(false),
        hallucination_type: non_empty(hallucination.kind),
        hallucination_details: non_empty(hallucination.details),
        requested_elements: elements.requested.unwrap_or_default(),
        missing_elements: elements.missing.unwrap_or_default(),
        extra_elements: elements.extra.unwrap_or_default(),
        suggested_fix: non_empty(raw.suggestion),
        raw: raw_value,
    })
}

/// HTTP client for the vision analysis service
pub struct HttpVisionAnalyzer {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpVisionAnalyzer {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout_secs: u64,
        min_interval_ms: u64,
    ) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new("vision", min_interval_ms),
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl VisionAnalyzer for HttpVisionAnalyzer {
    async fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        key: &AssetKey,
    ) -> Result<AnalysisResult, VisionError> {
        self.rate_limiter.wait().await;

        tracing::debug!(image_url, key = %key, "Requesting vision analysis");

        let mut request = self.http_client.post(&self.endpoint).json(&json!({
            "imageUrl": image_url,
            "prompt": prompt,
            "categoryId": key.category_id,
            "subcategoryId": key.subcategory_id,
            "styleId": key.style_id,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(VisionError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(VisionError::from_reqwest)?;

        if !status.is_success() {
            return Err(VisionError::Api(status.as_u16(), body));
        }

        parse_analysis(&body)
    }
}
