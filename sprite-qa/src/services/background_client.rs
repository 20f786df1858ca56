//! Background removal service client (best-effort)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Background removal errors
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("network: {0}")]
    Network(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("api error {0}: {1}")]
    Api(u16, String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("removal failed")]
    Failed,
}

/// Background removal seam
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Return the URL of a copy of the image with its background removed
    async fn remove_background(&self, image_url: &str) -> Result<String, BackgroundError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemovalResponse {
    success: bool,
    #[serde(default)]
    image_url: Option<String>,
}

/// HTTP client for the background removal service
pub struct HttpBackgroundRemover {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpBackgroundRemover {
    pub fn new(endpoint: String, timeout_secs: u64) -> Result<Self, BackgroundError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackgroundError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

#[async_trait]
impl BackgroundRemover for HttpBackgroundRemover {
    async fn remove_background(&self, image_url: &str) -> Result<String, BackgroundError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&json!({ "imageUrl": image_url }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackgroundError::Timeout(e.to_string())
                } else {
                    BackgroundError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackgroundError::Api(status.as_u16(), text));
        }

        let parsed: RemovalResponse = response
            .json()
            .await
            .map_err(|e| BackgroundError::Malformed(e.to_string()))?;

        match parsed {
            RemovalResponse {
                success: true,
                image_url: Some(url),
            } => Ok(url),
            _ => Err(BackgroundError::Failed),
        }
    }
}
