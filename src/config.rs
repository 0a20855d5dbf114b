use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::network::NetworkError;
use crate::retry::RetryPolicy;

pub const MIB: u64 = 1024 * 1024;

/// Smallest part size an S3-compatible store accepts for non-final parts.
pub const MULTIPART_MIN_PART_SIZE: u64 = 5 * MIB;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] NetworkError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploaderConfig {
    /// Control-plane root, e.g. `https://api.example.com/v1`
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub purpose: String,

    /// Files below this size use the single-upload init request
    pub single_upload_threshold: u64,
    pub chunk_size_bytes: u64,
    pub url_batch_size: u32,
    pub concurrency: usize,

    pub max_attempts: u32,
    pub base_delay_ms: u64,

    pub fingerprint_sample_bytes: u64,

    /// 0 = unlimited
    pub max_bytes_per_second: u32,

    /// SQLite URL for session checkpoints (e.g. `sqlite://uploads.db?mode=rwc`)
    pub session_db: Option<String>,

    pub enforce_multipart_minimum: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            bearer_token: None,
            purpose: "upload".to_string(),
            single_upload_threshold: 10 * MIB,
            chunk_size_bytes: 5 * MIB,
            url_batch_size: 10,
            concurrency: 3,
            max_attempts: 3,
            base_delay_ms: 1000,
            fingerprint_sample_bytes: MIB,
            max_bytes_per_second: 0,
            session_db: None,
            enforce_multipart_minimum: false,
        }
    }
}

impl UploaderConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Override connection settings from `CHUNKSTREAM_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CHUNKSTREAM_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(token) = std::env::var("CHUNKSTREAM_TOKEN") {
            self.bearer_token = Some(token);
        }
        if let Ok(db) = std::env::var("CHUNKSTREAM_SESSION_DB") {
            self.session_db = Some(db);
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("baseUrl", "must not be empty"));
        }
        if self.chunk_size_bytes == 0 {
            return Err(invalid("chunkSizeBytes", "must be greater than zero"));
        }
        if self.enforce_multipart_minimum && self.chunk_size_bytes < MULTIPART_MIN_PART_SIZE {
            return Err(invalid(
                "chunkSizeBytes",
                format!("must be at least {MULTIPART_MIN_PART_SIZE} bytes"),
            ));
        }
        if self.url_batch_size == 0 {
            return Err(invalid("urlBatchSize", "must be greater than zero"));
        }
        if !(1..=10).contains(&self.concurrency) {
            return Err(invalid("concurrency", "must be between 1 and 10"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("maxAttempts", "must be greater than zero"));
        }
        if self.fingerprint_sample_bytes == 0 {
            return Err(invalid("fingerprintSampleBytes", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
