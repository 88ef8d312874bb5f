//! Resource limit monitor configuration
//!
//! Every tracked resource shares the warning/critical percentages and the
//! alert cooldown; each has its own maximum.
//!
//! ```toml
//! [monitor]
//! check_interval_ms = 30000
//! warning_percent = 70.0
//! critical_percent = 90.0
//! alert_cooldown_ms = 900000
//! max_rpc_per_minute = 600
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::scan::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResourceMonitorConfig {
    /// Sampling tick
    ///
    /// Range: 1000-3600000
    /// Default: 30000
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Percentage of a limit at which a resource is classified `warning`
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,

    /// Percentage of a limit at which a resource is classified `critical`
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,

    /// Minimum time between two alerts at the same level for one resource
    #[serde(default = "default_alert_cooldown_ms")]
    pub alert_cooldown_ms: u64,

    #[serde(default = "default_max_rpc_per_minute")]
    pub max_rpc_per_minute: u64,

    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,

    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: u64,

    #[serde(default = "default_max_outbound_per_minute")]
    pub max_outbound_per_minute: u64,

    #[serde(default = "default_max_stored_records")]
    pub max_stored_records: u64,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
            alert_cooldown_ms: default_alert_cooldown_ms(),
            max_rpc_per_minute: default_max_rpc_per_minute(),
            max_memory_mb: default_max_memory_mb(),
            max_cpu_percent: default_max_cpu_percent(),
            max_outbound_per_minute: default_max_outbound_per_minute(),
            max_stored_records: default_max_stored_records(),
        }
    }
}

impl ResourceMonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }

    /// Validates monitor thresholds
    /// # Errors
    /// Returns `Error::Config` when:
    /// - `check_interval_ms` is out of range (1000-3600000)
    /// - thresholds are not `0 < warning < critical <= 100`
    /// - any resource maximum is 0
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=3_600_000).contains(&self.check_interval_ms) {
            return Err(invalid(format!(
                "monitor.check_interval_ms must be between 1000 and 3600000, got {}",
                self.check_interval_ms
            )));
        }

        if !(self.warning_percent > 0.0
            && self.warning_percent < self.critical_percent
            && self.critical_percent <= 100.0)
        {
            return Err(invalid(format!(
                "monitor thresholds must satisfy 0 < warning ({}) < critical ({}) <= 100",
                self.warning_percent, self.critical_percent
            )));
        }

        for (name, max) in [
            ("max_rpc_per_minute", self.max_rpc_per_minute),
            ("max_memory_mb", self.max_memory_mb),
            ("max_cpu_percent", self.max_cpu_percent),
            ("max_outbound_per_minute", self.max_outbound_per_minute),
            ("max_stored_records", self.max_stored_records),
        ] {
            if max == 0 {
                return Err(invalid(format!("monitor.{name} cannot be 0")));
            }
        }

        Ok(())
    }
}

fn default_check_interval_ms() -> u64 {
    30_000
}
fn default_warning_percent() -> f64 {
    70.0
}
fn default_critical_percent() -> f64 {
    90.0
}
fn default_alert_cooldown_ms() -> u64 {
    900_000
}
fn default_max_rpc_per_minute() -> u64 {
    600
}
fn default_max_memory_mb() -> u64 {
    512
}
fn default_max_cpu_percent() -> u64 {
    80
}
fn default_max_outbound_per_minute() -> u64 {
    1_200
}
fn default_max_stored_records() -> u64 {
    100_000
}
