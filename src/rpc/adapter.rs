//! Timeout and retry layer over a [`LedgerClient`].
//!
//! Every call is bounded by a hard timeout acquired from the adapter's
//! [`TimerRegistry`]. Registration-time and initial-sync calls are retried
//! with exponential backoff; steady-state scan calls are attempted once,
//! since a failed scan is picked up again by the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::Amount;
use super::LedgerClient;
use super::SignatureInfo;
use crate::task_with_timeout_and_exponential_backoff;
use crate::ResourceCounters;
use crate::RetryPolicies;
use crate::RpcError;
use crate::TimerRegistry;
use crate::Watermark;
use crate::RPC_CALL_LATENCY_MS;

const GET_BALANCE: &str = "getBalance";
const GET_SIGNATURES: &str = "getSignaturesForAddress";

/// State captured when an account is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub watermark: Watermark,
    pub balance: Amount,
}

pub struct RetryingRpcAdapter {
    client: Arc<dyn LedgerClient>,
    timers: TimerRegistry,
    counters: Arc<ResourceCounters>,
    policies: RetryPolicies,
    signature_limit: usize,
}

impl RetryingRpcAdapter {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        counters: Arc<ResourceCounters>,
        policies: RetryPolicies,
        signature_limit: usize,
    ) -> Self {
        Self {
            client,
            timers: TimerRegistry::new(),
            counters,
            policies,
            signature_limit: signature_limit.max(1),
        }
    }

    /// Hard-timeout timers currently armed.
    pub fn live_timers(&self) -> usize {
        self.timers.live_timers()
    }

    fn scan_timeout(&self) -> Duration {
        self.policies.rpc.timeout()
    }

    /// Counts and times one provider call.
    async fn instrumented<T, F>(
        &self,
        method: &'static str,
        fut: F,
    ) -> std::result::Result<T, RpcError>
    where
        F: Future<Output = std::result::Result<T, RpcError>>,
    {
        self.counters.track_rpc_request();
        let started = Instant::now();
        let result = fut.await;
        RPC_CALL_LATENCY_MS
            .with_label_values(&[method])
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn balance_once(
        &self,
        address: &str,
    ) -> std::result::Result<Amount, RpcError> {
        self.instrumented(GET_BALANCE, self.client.get_balance(address.to_string()))
            .await
    }

    async fn signatures_once(
        &self,
        address: &str,
        until: Option<String>,
        limit: usize,
    ) -> std::result::Result<Vec<SignatureInfo>, RpcError> {
        self.instrumented(
            GET_SIGNATURES,
            self.client.get_signatures_since(address.to_string(), until, limit),
        )
        .await
    }

    async fn latest_watermark_once(
        &self,
        address: &str,
    ) -> std::result::Result<Watermark, RpcError> {
        let newest = self.signatures_once(address, None, 1).await?;
        Ok(newest
            .first()
            .map(|s| Watermark::tx(s.signature.clone(), s.slot))
            .unwrap_or(Watermark::Empty))
    }

    async fn snapshot_once(
        &self,
        address: &str,
    ) -> std::result::Result<RegistrationSnapshot, RpcError> {
        let watermark = self.latest_watermark_once(address).await?;
        let balance = self.balance_once(address).await?;
        Ok(RegistrationSnapshot { watermark, balance })
    }

    /// Single attempt, bounded by the steady-state timeout.
    pub async fn fetch_balance(
        &self,
        address: &str,
    ) -> std::result::Result<Amount, RpcError> {
        self.timers
            .with_timeout(GET_BALANCE, self.scan_timeout(), self.balance_once(address))
            .await
    }

    /// Transactions newer than `since`, newest first, and the watermark to
    /// advance to. With no new transactions the watermark is `since`.
    ///
    /// Single attempt, bounded by the steady-state timeout.
    pub async fn fetch_new_transactions(
        &self,
        address: &str,
        since: &Watermark,
    ) -> std::result::Result<(Vec<SignatureInfo>, Watermark), RpcError> {
        let until = since.signature().map(str::to_string);
        let mut fetched = self
            .timers
            .with_timeout(
                GET_SIGNATURES,
                self.scan_timeout(),
                self.signatures_once(address, until, self.signature_limit),
            )
            .await?;

        // Providers that treat `until` inclusively or lag behind can hand back
        // history at or before the watermark.
        if let Watermark::Tx { signature, slot } = since {
            fetched.retain(|s| s.signature != *signature && s.slot >= *slot);
        }

        let watermark = fetched
            .first()
            .map(|s| Watermark::tx(s.signature.clone(), s.slot))
            .unwrap_or_else(|| since.clone());

        debug!(address, new = fetched.len(), ?watermark, "fetched new transactions");
        Ok((fetched, watermark))
    }

    /// Newest watermark of `address`, [`Watermark::Empty`] without history.
    ///
    /// Single attempt, bounded by the steady-state timeout.
    pub async fn fetch_latest_watermark(
        &self,
        address: &str,
    ) -> std::result::Result<Watermark, RpcError> {
        self.timers
            .with_timeout(
                GET_SIGNATURES,
                self.scan_timeout(),
                self.latest_watermark_once(address),
            )
            .await
    }

    /// Watermark for the one-time startup sync, retried with the RPC policy.
    pub async fn initial_sync_watermark(
        &self,
        address: &str,
    ) -> std::result::Result<Watermark, RpcError> {
        task_with_timeout_and_exponential_backoff(
            &self.timers,
            "initial_sync",
            || self.latest_watermark_once(address),
            self.policies.rpc,
        )
        .await
    }

    /// Watermark and balance at registration time, retried with the
    /// registration policy.
    pub async fn registration_snapshot(
        &self,
        address: &str,
    ) -> std::result::Result<RegistrationSnapshot, RpcError> {
        task_with_timeout_and_exponential_backoff(
            &self.timers,
            "register_account",
            || self.snapshot_once(address),
            self.policies.registration,
        )
        .await
    }
}
