use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Amount;
use crate::LedgerClient;
use crate::RpcError;
use crate::SignatureInfo;

/// In-memory ledger with configurable latency, failure injection and
/// concurrency instrumentation.
#[derive(Default)]
pub struct FakeLedger {
    /// address -> history, newest first
    histories: Mutex<HashMap<String, Vec<SignatureInfo>>>,
    balances: Mutex<HashMap<String, Amount>>,
    /// address -> calls left to fail
    failures: Mutex<HashMap<String, usize>>,
    latency: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    signature_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

struct ActiveCall<'a> {
    ledger: &'a FakeLedger,
}

impl<'a> ActiveCall<'a> {
    fn enter(ledger: &'a FakeLedger) -> Self {
        let now = ledger.active.fetch_add(1, Ordering::SeqCst) + 1;
        ledger.max_active.fetch_max(now, Ordering::SeqCst);
        Self { ledger }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.ledger.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_latency(
        &self,
        latency: Duration,
    ) {
        *self.latency.lock() = latency;
    }

    /// Appends a transaction as the newest entry of `address`'s history.
    pub fn push_tx(
        &self,
        address: &str,
        signature: &str,
        slot: u64,
    ) {
        self.histories.lock().entry(address.to_string()).or_default().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot,
                failed: false,
                block_time: None,
            },
        );
    }

    pub fn set_balance(
        &self,
        address: &str,
        balance: Amount,
    ) {
        self.balances.lock().insert(address.to_string(), balance);
    }

    /// The next `calls` calls touching `address` fail with a transport error.
    pub fn fail_next(
        &self,
        address: &str,
        calls: usize,
    ) {
        self.failures.lock().insert(address.to_string(), calls);
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active_calls(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn signature_calls(&self) -> usize {
        self.signature_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    async fn simulate(
        &self,
        address: &str,
    ) -> Result<(), RpcError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock();
        if let Some(left) = failures.get_mut(address) {
            if *left > 0 {
                *left -= 1;
                return Err(RpcError::Transport(format!("injected failure for {address}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn get_balance(
        &self,
        address: String,
    ) -> Result<Amount, RpcError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveCall::enter(self);
        self.simulate(&address).await?;
        Ok(self.balances.lock().get(&address).copied().unwrap_or(0))
    }

    async fn get_signatures_since(
        &self,
        address: String,
        until: Option<String>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveCall::enter(self);
        self.simulate(&address).await?;

        let histories = self.histories.lock();
        let history = histories.get(&address).map(Vec::as_slice).unwrap_or(&[]);
        Ok(history
            .iter()
            .take_while(|s| until.as_deref() != Some(s.signature.as_str()))
            .take(limit)
            .cloned()
            .collect())
    }
}
