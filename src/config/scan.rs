use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Lower bound for the base poll interval; anything faster burns provider quota.
pub const MIN_POLL_INTERVAL_MS: u64 = 5_000;

/// Upper bound for per-tick fan-out.
pub const MAX_CONCURRENCY: usize = 20;

/// An inactivity tier: once an account has been idle for `idle_after_secs`,
/// its poll interval is raised to at least `interval_ms`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct IdleTier {
    pub idle_after_secs: u64,
    pub interval_ms: u64,
}

/// Scheduler cadence and fan-out settings.
///
/// ```toml
/// [scan]
/// poll_interval_ms = 15000
/// concurrency = 3
/// idle_tiers = [
///   { idle_after_secs = 3600, interval_ms = 60000 },
///   { idle_after_secs = 86400, interval_ms = 300000 },
/// ]
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    /// Base tick interval and the interval of any recently active account.
    ///
    /// Range: >= 5000
    /// Default: 15000
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of accounts scanned at the same time within a tick.
    ///
    /// Range: 1-20
    /// Default: 3
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Overall budget for the one-time cursor sync performed by `start()`.
    #[serde(default = "default_initial_sync_timeout_ms")]
    pub initial_sync_timeout_ms: u64,

    /// Size of the most recent transaction window requested per fetch.
    ///
    /// Range: 1-1000
    #[serde(default = "default_signature_limit")]
    pub signature_limit: usize,

    /// Inactivity escalation tiers, ordered by `idle_after_secs`.
    #[serde(default = "default_idle_tiers")]
    pub idle_tiers: Vec<IdleTier>,

    /// Ceiling no escalated interval may exceed.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// How often the subscription list is reconciled with the persistent
    /// store. 0 disables periodic reconciliation.
    #[serde(default = "default_subscription_refresh_interval_ms")]
    pub subscription_refresh_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            concurrency: default_concurrency(),
            initial_sync_timeout_ms: default_initial_sync_timeout_ms(),
            signature_limit: default_signature_limit(),
            idle_tiers: default_idle_tiers(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            subscription_refresh_interval_ms: default_subscription_refresh_interval_ms(),
        }
    }
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    pub fn initial_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_sync_timeout_ms)
    }

    /// Returns the interval prescribed for an account idle for `idle`,
    /// clamped to the configured ceiling.
    pub fn interval_for_idle(
        &self,
        idle: Duration,
    ) -> Duration {
        let mut interval_ms = self.poll_interval_ms;
        for tier in &self.idle_tiers {
            if idle >= Duration::from_secs(tier.idle_after_secs) {
                interval_ms = interval_ms.max(tier.interval_ms);
            }
        }
        Duration::from_millis(interval_ms.min(self.max_poll_interval_ms))
    }

    /// Validates scheduler settings
    /// # Errors
    /// Returns `Error::Config` when:
    /// - `poll_interval_ms` is below 5000
    /// - `concurrency` is outside 1-20
    /// - `signature_limit` is outside 1-1000
    /// - the ceiling is below the base interval
    /// - tiers are unordered or below the base interval
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(invalid(format!(
                "scan.poll_interval_ms must be >= {}, got {}",
                MIN_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }

        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(invalid(format!(
                "scan.concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }

        if self.initial_sync_timeout_ms == 0 {
            return Err(invalid("scan.initial_sync_timeout_ms cannot be 0".to_string()));
        }

        if !(1..=1000).contains(&self.signature_limit) {
            return Err(invalid(format!(
                "scan.signature_limit must be between 1 and 1000, got {}",
                self.signature_limit
            )));
        }

        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(invalid(format!(
                "scan.max_poll_interval_ms ({}) must be >= scan.poll_interval_ms ({})",
                self.max_poll_interval_ms, self.poll_interval_ms
            )));
        }

        let mut previous_idle: Option<u64> = None;
        for tier in &self.idle_tiers {
            if previous_idle.is_some_and(|p| tier.idle_after_secs <= p) {
                return Err(invalid(
                    "scan.idle_tiers must be strictly ordered by idle_after_secs".to_string(),
                ));
            }
            if tier.interval_ms < self.poll_interval_ms {
                return Err(invalid(format!(
                    "scan.idle_tiers interval_ms {} is below the base poll interval",
                    tier.interval_ms
                )));
            }
            previous_idle = Some(tier.idle_after_secs);
        }

        Ok(())
    }
}

pub(super) fn invalid(msg: String) -> Error {
    Error::Config(ConfigError::Message(msg))
}

fn default_poll_interval_ms() -> u64 {
    15_000
}
fn default_concurrency() -> usize {
    3
}
fn default_initial_sync_timeout_ms() -> u64 {
    30_000
}
fn default_signature_limit() -> usize {
    20
}
fn default_idle_tiers() -> Vec<IdleTier> {
    vec![
        IdleTier {
            idle_after_secs: 3_600,
            interval_ms: 60_000,
        },
        IdleTier {
            idle_after_secs: 86_400,
            interval_ms: 300_000,
        },
    ]
}
fn default_max_poll_interval_ms() -> u64 {
    300_000
}
fn default_subscription_refresh_interval_ms() -> u64 {
    300_000
}
