//! Scan configuration.
//!
//! All externally imposed bounds (index batch size, retry ceiling,
//! concurrency limit) are configuration values, never hardcoded in the
//! pipeline. Defaults match the documented limits of the default services.
//!
//! # Example Configuration
//!
//! ```toml
//! lockfile_name = "uv.lock"
//!
//! [github]
//! api_base = "https://api.github.com"
//!
//! [index]
//! base_url = "https://ossindex.sonatype.org"
//! max_batch_size = 128
//! max_retries = 3
//! retry_backoff_ms = 1500
//! max_concurrency = 4
//! timeout_secs = 30
//! ```
//!
//! Credentials are usually taken from the environment instead of the file:
//! `GITHUB_TOKEN`, `OSS_INDEX_EMAIL`, `OSS_INDEX_API`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Exact filename to match during lock-file discovery.
    pub lockfile_name: String,

    pub github: GithubConfig,

    pub index: IndexConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lockfile_name: "uv.lock".to_string(),
            github: GithubConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Loads configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ScanConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Fills unset credentials from the environment: `GITHUB_TOKEN` for the
    /// repository host, `OSS_INDEX_EMAIL` / `OSS_INDEX_API` for the index.
    pub fn apply_env(&mut self) {
        if self.github.token.is_none() {
            self.github.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        if self.index.auth_email.is_none() {
            self.index.auth_email = std::env::var("OSS_INDEX_EMAIL")
                .ok()
                .filter(|t| !t.is_empty());
        }
        if self.index.auth_token.is_none() {
            self.index.auth_token = std::env::var("OSS_INDEX_API")
                .ok()
                .filter(|t| !t.is_empty());
        }
    }
}

/// Repository host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// API base URL. Overridable for GitHub Enterprise or tests.
    pub api_base: String,

    /// Optional bearer token. Required for private repositories, raises
    /// rate limits for public ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

/// Vulnerability index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index base URL. Overridable for tests or a caching proxy.
    pub base_url: String,

    /// Basic-auth username (the account email) for the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_email: Option<String>,

    /// Basic-auth API token for the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Maximum coordinates per batch request. OSS Index caps this at 128;
    /// the bound is the service's contract, not ours.
    pub max_batch_size: usize,

    /// Total attempts per batch before its packages are marked incomplete.
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts. A rate-limit
    /// response carrying `Retry-After` overrides this for that attempt.
    pub retry_backoff_ms: u64,

    /// Hard ceiling on concurrent in-flight index requests.
    pub max_concurrency: usize,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ossindex.sonatype.org".to_string(),
            auth_email: None,
            auth_token: None,
            max_batch_size: 128,
            max_retries: 3,
            retry_backoff_ms: 1500,
            max_concurrency: 4,
            timeout_secs: 30,
        }
    }
}

impl IndexConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
