//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::ratelimit::{PolicySpec, SweeperConfig, WindowPolicy, DEFAULT_LIMIT, DEFAULT_WINDOW};

/// Prefix for environment overrides, e.g. `TURNSTILE__LIMITER__DEFAULT_LIMIT=50`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Idle key eviction configuration
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admissions per window when no policy is given
    #[serde(default = "default_limit")]
    pub default_limit: f64,

    /// Window length in milliseconds when no policy is given
    #[serde(default = "default_window_ms")]
    pub default_window_ms: f64,

    /// Path to a policy rules YAML file
    #[serde(default)]
    pub rules_path: Option<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_window_ms: default_window_ms(),
            rules_path: None,
        }
    }
}

impl LimiterConfig {
    /// The configured default policy; bad values fall back to 20 per 60s.
    pub fn default_policy(&self) -> WindowPolicy {
        PolicySpec {
            limit: Some(self.default_limit),
            window_ms: Some(self.default_window_ms),
        }
        .resolve(&WindowPolicy::default())
    }
}

fn default_limit() -> f64 {
    DEFAULT_LIMIT as f64
}

fn default_window_ms() -> f64 {
    DEFAULT_WINDOW.as_millis() as f64
}

/// Idle key eviction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Whether to run the background sweeper
    #[serde(default = "default_eviction_enabled")]
    pub enabled: bool,

    /// Sweep interval in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Keys idle for longer than this (milliseconds) are evicted
    #[serde(default = "default_idle_horizon")]
    pub idle_horizon_ms: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: default_eviction_enabled(),
            sweep_interval_ms: default_sweep_interval(),
            idle_horizon_ms: default_idle_horizon(),
        }
    }
}

impl EvictionConfig {
    /// Build the sweeper settings.
    pub fn sweeper_config(&self) -> Result<SweeperConfig> {
        SweeperConfig::new(
            Duration::from_millis(self.sweep_interval_ms),
            Duration::from_millis(self.idle_horizon_ms),
        )
    }
}

fn default_eviction_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    30_000
}

fn default_idle_horizon() -> u64 {
    300_000
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `turnstile=debug`
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

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load defaults, then the optional file, then `TURNSTILE__*` environment
    /// overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
