use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::scan::invalid;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (at least 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation hard timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after the `attempt`-th failure (1-based): the base delay
    /// doubled per attempt, capped at `max_delay_ms`.
    pub fn delay_after(
        &self,
        attempt: usize,
    ) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as u32;
        let delay = self.base_delay_ms.saturating_mul(2u64.saturating_pow(exp));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(invalid(format!("retry.{name}.max_retries must be >= 1")));
        }
        if self.timeout_ms == 0 {
            return Err(invalid(format!("retry.{name}.timeout_ms cannot be 0")));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid(format!(
                "retry.{name}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by call site
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Steady-state and initial-sync calls. Scan calls only use `timeout_ms`;
    /// a failed scan is picked up again by the next tick instead of retried.
    #[serde(default = "default_rpc_policy")]
    pub rpc: BackoffPolicy,

    /// Registration-time calls (2s, 4s, 6s backoff)
    #[serde(default = "default_registration_policy")]
    pub registration: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            rpc: default_rpc_policy(),
            registration: default_registration_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.rpc.validate("rpc")?;
        self.registration.validate("registration")?;
        Ok(())
    }
}

fn default_rpc_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 10_000,
        base_delay_ms: 1_000,
        max_delay_ms: 8_000,
    }
}
fn default_registration_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 3_000,
        base_delay_ms: 2_000,
        max_delay_ms: 6_000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    10_000
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    8_000
}
