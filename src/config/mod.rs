//! Configuration management for the account watcher.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`WATCHER_CONFIG_PATH`)
//! - Environment variable overrides (`WATCHER__SECTION__FIELD`)
//! - Component-wise validation with explicit ranges
mod dedup;
mod monitoring;
mod resource;
mod retry;
mod rpc;
mod scan;
pub use dedup::*;
pub use monitoring::*;
pub use resource::*;
pub use retry::*;
pub use rpc::*;
pub use scan::*;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod resource_test;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "WATCHER_CONFIG_PATH";

/// Prefix for per-field environment overrides
pub const ENV_PREFIX: &str = "WATCHER";

/// One `{address, subscriber}` pair supplied statically through configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    pub address: String,
    pub subscriber_id: String,
}

/// Main configuration container for the watcher components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `WATCHER_CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WatcherConfig {
    /// Tick cadence, fan-out and adaptive interval tiers
    #[serde(default)]
    pub scan: ScanConfig,
    /// Retry policies for steady-state and registration RPC calls
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Notification dedup window
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Resource limit thresholds and sampling cadence
    #[serde(default)]
    pub monitor: ResourceMonitorConfig,
    /// Remote ledger endpoint
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Prometheus / health exporter
    #[serde(default)]
    pub exporter: ExporterConfig,
    /// Static subscription list used by the daemon
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl WatcherConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `WATCHER_CONFIG_PATH` (if set)
    /// 3. Environment variables with `WATCHER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("WATCHER__SCAN__CONCURRENCY", "5");
    /// let cfg = WatcherConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(Self::environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section, returning the configuration on success so
    /// loading can be chained: `WatcherConfig::new()?.validate()?`.
    pub fn validate(self) -> Result<Self> {
        self.scan.validate()?;
        self.retry.validate()?;
        self.dedup.validate()?;
        self.monitor.validate()?;
        self.rpc.validate()?;
        self.exporter.validate()?;
        Ok(self)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true)
    }
}
