//! Bootstrap configuration loading
//!
//! Resolution priority (highest first):
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable (`SPRITE_QA_*`)
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! Everything in the TOML file is optional; a missing file yields defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for all overrides
pub const ENV_PREFIX: &str = "SPRITE_QA_";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
    pub worker: WorkerConfig,
    pub verification: VerificationConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5740,
        }
    }
}

/// SQLite settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to SQLite database file; OS data dir when absent
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    /// Upper bound on lock-contention retries for status transitions
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 10,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// External service endpoints and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub vision_url: String,
    pub vision_api_key: Option<String>,
    pub vision_timeout_secs: u64,
    /// Minimum spacing between vision requests
    pub vision_min_interval_ms: u64,

    pub generation_url: String,
    pub generation_api_key: Option<String>,
    pub generation_timeout_secs: u64,

    /// Background removal is optional; disabled when absent
    pub background_url: Option<String>,
    pub background_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vision_url: "http://127.0.0.1:8700/analyze".to_string(),
            vision_api_key: None,
            vision_timeout_secs: 60,
            vision_min_interval_ms: 500,
            generation_url: "http://127.0.0.1:8701/generate".to_string(),
            generation_api_key: None,
            generation_timeout_secs: 120,
            background_url: None,
            background_timeout_secs: 30,
        }
    }
}

/// Analysis worker tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run the periodic drain loop inside the service
    pub enabled: bool,
    pub poll_interval_secs: u64,
    /// Jobs drained per tick
    pub batch_size: u32,
    /// Pause between jobs within one drain
    pub job_delay_ms: u64,
    pub max_retries: u32,
    /// Retry jobs whose analyzer response could not be parsed
    pub retry_malformed: bool,
    /// Age after which a `processing` claim is considered abandoned
    pub stale_after_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 120,
            batch_size: 10,
            job_delay_ms: 500,
            max_retries: 3,
            retry_malformed: true,
            stale_after_secs: 600,
        }
    }
}

/// Fix verification tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Pause between batch items
    pub batch_delay_ms: u64,
    pub default_limit: u32,
    pub min_occurrences: i64,
    /// Quality tier passed to the generation service
    pub quality_tier: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 2000,
            default_limit: 5,
            min_occurrences: 2,
            quality_tier: "starter".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from `path` if given, else the default location, else defaults.
    /// Environment overrides are applied on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => {
                    tracing::info!("Loading config from {}", p.display());
                    Self::load(&p)?
                }
                None => Self::default(),
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `SPRITE_QA_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("DATABASE") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| Error::Config(format!("{}PORT is not a port: {}", ENV_PREFIX, v)))?;
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_var("VISION_URL") {
            self.services.vision_url = v;
        }
        if let Some(v) = env_var("VISION_API_KEY") {
            self.services.vision_api_key = Some(v);
        }
        if let Some(v) = env_var("GENERATION_URL") {
            self.services.generation_url = v;
        }
        if let Some(v) = env_var("GENERATION_API_KEY") {
            self.services.generation_api_key = Some(v);
        }
        if let Some(v) = env_var("BACKGROUND_URL") {
            self.services.background_url = Some(v);
        }
        Ok(())
    }

    /// Database path: configured value or OS default
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("sprite-qa.db"))
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, suffix))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sprite-qa").join("config.toml"))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sprite-qa"))
        .unwrap_or_else(|| PathBuf::from("./sprite_qa_data"))
}
