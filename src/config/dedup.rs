//! Notification dedup configuration
//!
//! ```toml
//! [dedup]
//! ttl_secs = 86400          # how long an identifier stays "already notified"
//! sweep_interval_ms = 600000
//! max_entries = 100000
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::scan::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DedupConfig {
    /// Time-to-live of a delivered event identifier
    ///
    /// Range: 1-604800 (1s to 7 days)
    /// Default: 86400 (24h)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Background sweep interval in milliseconds
    ///
    /// Expiry is checked lazily on read; the sweep only bounds memory for
    /// identifiers that are never read again.
    ///
    /// Range: 1000-3600000
    /// Default: 600000 (10 min)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Hard cap on tracked identifiers; the soonest-expiring are evicted first.
    ///
    /// Default: 100000
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_entries: default_max_entries(),
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=604_800).contains(&self.ttl_secs) {
            return Err(invalid(format!(
                "dedup.ttl_secs must be between 1 and 604800, got {}",
                self.ttl_secs
            )));
        }

        if !(1_000..=3_600_000).contains(&self.sweep_interval_ms) {
            return Err(invalid(format!(
                "dedup.sweep_interval_ms must be between 1000 and 3600000, got {}",
                self.sweep_interval_ms
            )));
        }

        if self.max_entries == 0 {
            return Err(invalid("dedup.max_entries cannot be 0".to_string()));
        }

        Ok(())
    }
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval_ms() -> u64 {
    600_000
}

fn default_max_entries() -> usize {
    100_000
}
