use crate::constants::{
    ALGO_RANDOM, DEFAULT_BASE_URL, DEFAULT_EPSILON, DEFAULT_METRICS_PATH, DEFAULT_ORIGIN,
    DEFAULT_SITE_PATH,
};
use crate::error::BanditResult;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration. Loaded from environment variables with the prefix
/// `INSTANT_BANDIT__` and an optional TOML/JSON config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_site_path")]
    pub site_path: String,
    /// Blank disables metrics delivery entirely.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default)]
    pub append_timestamp: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Directory for file-backed sessions. Sessions are kept in memory when unset.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_site_path() -> String {
    DEFAULT_SITE_PATH.to_string()
}
fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_flush_interval_ms() -> u64 {
    50
}
fn default_algorithm() -> String {
    ALGO_RANDOM.to_string()
}
fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}
fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            site_path: default_site_path(),
            metrics_path: default_metrics_path(),
            append_timestamp: false,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            default_algorithm: default_algorithm(),
            origin: default_origin(),
            epsilon: default_epsilon(),
            session_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn load() -> BanditResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional file, overridden by environment variables.
    pub fn load_from(path: Option<&str>) -> BanditResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("INSTANT_BANDIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// `false` when no collection endpoint is configured.
    pub fn metrics_enabled(&self) -> bool {
        !self.metrics_path.trim().is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}
