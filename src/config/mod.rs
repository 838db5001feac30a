//! Configuration for the drift synchronization engine.

mod vars;

pub use vars::interpolate;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-catalog synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the catalog export (line-delimited JSON sorted by key).
    pub source: String,
    /// Remote index name. Defaults to the catalog key.
    pub index: Option<String>,
    /// Caller-supplied upper bound on operations per chunk, applied in
    /// addition to the quota-derived bound.
    pub preferred_chunk_size: Option<usize>,
}

impl CatalogConfig {
    /// Remote index name for this catalog.
    pub fn index_name<'a>(&'a self, catalog: &'a str) -> &'a str {
        self.index.as_deref().unwrap_or(catalog)
    }
}

/// Delivery endpoint, credentials, and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Account identifier; candidate hosts are derived from it.
    pub application_id: String,
    /// API key sent with every request.
    #[serde(default)]
    pub api_key: String,
    /// Service domain the candidate hosts live under.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Maximum serialized payload size per delivery request.
    #[serde(default = "default_byte_quota")]
    pub byte_quota: usize,
    /// Fraction of the quota reserved as safety margin.
    #[serde(default = "default_safety_margin")]
    pub safety_margin_ratio: f64,
    /// Failed-chunk budget: resend subdivision count and run-abort
    /// threshold.
    #[serde(default = "default_max_failed_chunks")]
    pub max_failed_chunks: usize,
    /// How long a host stays marked down before being retried.
    #[serde(default = "default_host_cooldown_ms")]
    pub host_cooldown_ms: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_domain() -> String {
    "search-api.net".to_string()
}

fn default_byte_quota() -> usize {
    600_000
}

fn default_safety_margin() -> f64 {
    0.2
}

fn default_max_failed_chunks() -> usize {
    3
}

fn default_host_cooldown_ms() -> u64 {
    300_000
}

fn default_timeout_secs() -> u64 {
    30
}

impl DeliveryConfig {
    /// Host cool-down as a `Duration`.
    pub fn host_cooldown(&self) -> Duration {
        Duration::from_millis(self.host_cooldown_ms)
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for the Prometheus endpoint.
    #[serde(default = "default_metrics_address")]
    pub address: String,
    /// Disable the endpoint entirely (one-shot jobs under an external
    /// scraper often do).
    #[serde(default)]
    pub disabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            address: default_metrics_address(),
            disabled: false,
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Catalogs to synchronize, keyed by job name.
    pub catalogs: BTreeMap<String, CatalogConfig>,
    /// Delivery settings shared by all catalogs of this account.
    pub delivery: DeliveryConfig,
    /// Directory holding per-catalog snapshots.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    /// Directory holding per-job run reports.
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_snapshot_dir() -> String {
    "./state/snapshots".to_string()
}

fn default_report_dir() -> String {
    "./state/reports".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let interpolated =
            interpolate(contents).map_err(|errors| ConfigError::EnvInterpolation {
                message: errors.join("\n"),
            })?;

        let config: Config = serde_yaml::from_str(&interpolated)
            .map_err(|source| ConfigError::YamlParse { source })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalogs.is_empty() {
            return Err(ConfigError::NoCatalogs);
        }
        for (catalog, cfg) in &self.catalogs {
            if cfg.source.is_empty() {
                return Err(ConfigError::EmptySourcePath {
                    catalog: catalog.clone(),
                });
            }
        }
        if self.delivery.application_id.is_empty() {
            return Err(ConfigError::EmptyApplicationId);
        }
        if !(0.0..1.0).contains(&self.delivery.safety_margin_ratio) {
            return Err(ConfigError::InvalidSafetyMargin {
                ratio: self.delivery.safety_margin_ratio,
            });
        }
        if self.delivery.byte_quota == 0 {
            return Err(ConfigError::InvalidByteQuota {
                quota: self.delivery.byte_quota,
            });
        }
        Ok(())
    }
}
