//! Configuration management for reprodock
//!
//! Settings load from environment variables with sensible defaults; CLI
//! flags override them afterwards. The repair token is only required when a
//! real fixer is constructed, so discovery-only commands work without it.
//!
//! # Environment Variables
//!
//! - `REPRODOCK_BASE_IMAGE`: image whose version token gets substituted - default: "ubuntu"
//! - `REPRODOCK_VERSIONS`: comma-separated target version matrix
//! - `REPRODOCK_MAX_RETRIES`: repair attempts per build - default: "3"
//! - `REPRODOCK_RETRY_DELAY_SECS`: fixed delay between repair attempts - default: "2"
//! - `REPRODOCK_REPAIR_ENDPOINT`: text-generation endpoint URL
//! - `REPRODOCK_REPAIR_TIMEOUT`: repair request timeout in seconds - default: "60"
//! - `REPRODOCK_RESULTS`: outcome table path - default: "results.csv"
//! - `REPRODOCK_IMPLICIT_PASS`: marker-free run output counts as one pass - default: "true"
//! - `REPRODOCK_LOG_LEVEL`: logging level - default: "info"
//! - `HUGGINGFACE_API_TOKEN`: bearer token for the repair service

use crate::repair::HuggingFaceFixer;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEFAULT_BASE_IMAGE: &str = "ubuntu";
const DEFAULT_VERSIONS: &[&str] = &["14.04", "16.04", "18.04", "20.04", "22.04", "24.04"];
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_REPAIR_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/meta-llama/Llama-3.2-3B-Instruct";
const DEFAULT_REPAIR_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RESULTS_PATH: &str = "results.csv";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Bounded build-log capture, in lines. Keeps repair-prompt and audit sizes
/// independent of build verbosity.
pub const LOG_TAIL_LINES: usize = 200;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Repair token missing while a real fixer is required
    #[error("Repair token not configured. Set the HUGGINGFACE_API_TOKEN environment variable")]
    MissingRepairToken,

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration structure for reprodock
#[derive(Debug, Clone)]
pub struct ReprodockConfig {
    /// Base image whose version token is substituted per target version
    pub base_image: String,

    /// Ordered target version matrix, applied identically to every artifact
    pub versions: Vec<String>,

    /// Hard ceiling on repair attempts per (artifact, version) build
    pub max_repair_retries: u32,

    /// Fixed delay between repair attempts (a courtesy to the service)
    pub retry_delay: Duration,

    /// Repair service endpoint URL
    pub repair_endpoint: String,

    /// Bearer token for the repair service, if configured
    pub repair_api_token: Option<String>,

    /// Repair request timeout; a timeout counts as "no usable content"
    pub repair_timeout: Duration,

    /// Outcome table path
    pub results_path: PathBuf,

    /// Marker-free run output counts as one implicit pass
    pub implicit_pass: bool,

    /// Bounded log capture, in lines
    pub log_tail: usize,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ReprodockConfig {
    /// Loads configuration from environment variables with defaults.
    fn default() -> Self {
        let versions = env::var("REPRODOCK_VERSIONS")
            .map(|raw| {
                raw.split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect());

        Self {
            base_image: env::var("REPRODOCK_BASE_IMAGE")
                .unwrap_or_else(|_| DEFAULT_BASE_IMAGE.to_string()),
            versions,
            max_repair_retries: parse_env("REPRODOCK_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_secs(parse_env(
                "REPRODOCK_RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )),
            repair_endpoint: env::var("REPRODOCK_REPAIR_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_REPAIR_ENDPOINT.to_string()),
            repair_api_token: env::var("HUGGINGFACE_API_TOKEN").ok(),
            repair_timeout: Duration::from_secs(parse_env(
                "REPRODOCK_REPAIR_TIMEOUT",
                DEFAULT_REPAIR_TIMEOUT_SECS,
            )),
            results_path: PathBuf::from(
                env::var("REPRODOCK_RESULTS").unwrap_or_else(|_| DEFAULT_RESULTS_PATH.to_string()),
            ),
            implicit_pass: parse_env("REPRODOCK_IMPLICIT_PASS", true),
            log_tail: LOG_TAIL_LINES,
            log_level: env::var("REPRODOCK_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

impl ReprodockConfig {
    /// Validates the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_image.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "base image must not be empty".to_string(),
            ));
        }
        if self.versions.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "version matrix must not be empty".to_string(),
            ));
        }
        if self.repair_endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "repair endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a repair token is present in the environment.
    pub fn has_repair_token(&self) -> bool {
        self.repair_api_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Constructs the real repair client from this configuration.
    pub fn create_fixer(&self) -> Result<HuggingFaceFixer, ConfigError> {
        let token = self
            .repair_api_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingRepairToken)?;

        Ok(HuggingFaceFixer::with_timeout(
            self.repair_endpoint.clone(),
            token,
            self.repair_timeout,
        ))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}='{}'", key, raw);
            default
        }),
        Err(_) => default,
    }
}
