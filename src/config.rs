//! Configuration management for Slidegate.
//!
//! Configuration comes from an optional YAML file layered with
//! `SLIDEGATE__`-prefixed environment variables, e.g.
//! `SLIDEGATE__SWEEPER__INTERVAL_SECS=600`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::{Action, Policy, PolicyTable};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SLIDEGATE";

/// Main configuration for Slidegate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidegateConfig {
    /// Eviction sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Per-action policy overrides, merged over the shipped defaults
    #[serde(default)]
    pub policies: HashMap<Action, PolicyOverride>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A partial policy for one action.
///
/// Fields left unset keep the action's shipped value, so
/// `SLIDEGATE__POLICIES__SEARCH__LIMIT=50` alone is a valid override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    /// Replacement limit
    #[serde(default)]
    pub limit: Option<u32>,

    /// Replacement window in milliseconds
    #[serde(default)]
    pub window_ms: Option<u64>,
}

impl PolicyOverride {
    /// Apply this override on top of `base`.
    pub fn apply(&self, base: Policy) -> Policy {
        Policy {
            limit: self.limit.unwrap_or(base.limit),
            window_ms: self.window_ms.unwrap_or(base.window_ms),
        }
    }
}

/// Eviction sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Timestamps older than this many seconds are purged by a sweep
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            max_age_secs: default_max_age(),
        }
    }
}

impl SweeperConfig {
    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Age past which a timestamp is garbage.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Check the sweeper settings against the policies it will sweep.
    ///
    /// `max_age` must exceed every policy window, or a sweep could delete
    /// timestamps that still count against a quota.
    pub fn validate(&self, policies: &PolicyTable) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(SlidegateError::Config(
                "sweeper.interval_secs must be greater than 0".to_string(),
            ));
        }

        let max_window = policies.max_window();
        if self.max_age() <= max_window {
            return Err(SlidegateError::Config(format!(
                "sweeper.max_age_secs ({}) must exceed the longest policy window ({}ms)",
                self.max_age_secs,
                max_window.as_millis()
            )));
        }
        Ok(())
    }
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_max_age() -> u64 {
    86400
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
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

impl SlidegateConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from a YAML file, with environment overrides on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(SlidegateError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Build the effective policy table and check the sweeper against it.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let merged: HashMap<Action, Policy> = self
            .policies
            .iter()
            .map(|(action, over)| (*action, over.apply(action.default_policy())))
            .collect();

        let table = PolicyTable::with_overrides(&merged)?;
        self.sweeper.validate(&table)?;
        Ok(table)
    }
}
