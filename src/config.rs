//! Configuration management for Floodgate.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{Quota, TimeUnit};

/// Prefix for environment overrides, e.g. `FLOODGATE__LIMITER__LIMIT=50`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for Floodgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which limiting strategy to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    SlidingLog,
    TokenBucket,
}

impl std::str::FromStr for StrategyKind {
    type Err = FloodgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sliding_log" | "sliding-log" => Ok(StrategyKind::SlidingLog),
            "token_bucket" | "token-bucket" => Ok(StrategyKind::TokenBucket),
            other => Err(FloodgateError::InvalidConfig(format!(
                "unknown strategy '{}'",
                other
            ))),
        }
    }
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Limiting strategy
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Admissions allowed per window. Signed so that a negative value is
    /// reported instead of failing to parse.
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Window length in milliseconds; takes precedence over `unit`
    #[serde(default)]
    pub window_ms: Option<u64>,

    /// Window as a named unit
    #[serde(default)]
    pub unit: Option<TimeUnit>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            limit: default_limit(),
            window_ms: None,
            unit: None,
        }
    }
}

fn default_limit() -> i64 {
    100
}

impl LimiterConfig {
    /// Resolve and validate the quota this configuration describes.
    pub fn quota(&self) -> Result<Quota> {
        let limit = u64::try_from(self.limit).map_err(|_| {
            FloodgateError::InvalidConfig(format!("limit must not be negative, got {}", self.limit))
        })?;

        let window = match (self.window_ms, self.unit) {
            (Some(ms), _) => Duration::from_millis(ms),
            (None, Some(unit)) => unit.duration(),
            (None, None) => TimeUnit::Second.duration(),
        };

        Quota::new(limit, window)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FloodgateConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `FLOODGATE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::InvalidConfig(format!("Failed to parse config: {}", e)))
    }
}
