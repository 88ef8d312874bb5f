use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::RpcError;

/// Balance in the ledger's smallest unit.
pub type Amount = u64;

/// One entry of an account's transaction history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    /// Transaction landed but failed on chain
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// Remote ledger provider.
///
/// Any client exposing a balance lookup and a "signatures newer than X"
/// history query is pluggable. Implementations must not retry internally;
/// timeouts and retries are applied by [`crate::RetryingRpcAdapter`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    async fn get_balance(
        &self,
        address: String,
    ) -> std::result::Result<Amount, RpcError>;

    /// Returns at most `limit` signatures for `address`, newest first,
    /// stopping before `until` when given.
    async fn get_signatures_since(
        &self,
        address: String,
        until: Option<String>,
        limit: usize,
    ) -> std::result::Result<Vec<SignatureInfo>, RpcError>;
}
