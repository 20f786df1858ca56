//! Image generation service client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("sprite-qa/", env!("CARGO_PKG_VERSION"));

/// Generation client errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network: {0}")]
    Network(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("api error {0}: {1}")]
    Api(u16, String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout(err.to_string())
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}

/// Parameters for one generation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: u32,
    pub steps: u32,
    pub guidance: f32,
    pub width: u32,
    pub height: u32,
}

/// Image generation seam
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return its URL
    async fn generate(
        &self,
        request: &GenerationRequest,
        quality_tier: &str,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    success: bool,
    #[serde(default)]
    images: Vec<GeneratedImage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}

/// HTTP client for the generation service
pub struct HttpImageGenerator {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageGenerator {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        quality_tier: &str,
    ) -> Result<String, GenerationError> {
        tracing::debug!(seed = request.seed, quality_tier, "Requesting image generation");

        let mut body = serde_json::to_value(request)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        body["qualityTier"] = serde_json::Value::String(quality_tier.to_string());

        let mut call = self.http_client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key);
        }

        let response = call.send().await.map_err(GenerationError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(status.as_u16(), text));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        if !parsed.success {
            return Err(GenerationError::Failed(
                parsed.error.unwrap_or_else(|| "service reported failure".to_string()),
            ));
        }

        parsed
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or_else(|| GenerationError::Failed("no images returned".to_string()))
    }
}
