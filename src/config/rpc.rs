use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::scan::invalid;
use crate::Result;

/// Remote ledger JSON-RPC endpoint used by the daemon's client.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Transport-level request timeout. Independent of the adapter's hard
    /// per-call timeout, which is always enforced on top.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(invalid(format!(
                "rpc.endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("rpc.request_timeout_ms cannot be 0".to_string()));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}
