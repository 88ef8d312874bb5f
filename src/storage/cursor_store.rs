//! Per-account cursor tracking.
//!
//! The store maps an address to its last observed [`Watermark`] plus the
//! activity metadata that drives the adaptive poll cadence. Absence of an
//! entry means "never synced"; [`Watermark::Empty`] means "synced, the
//! account had no history at that time".
//!
//! Cursors are monotonic: once a watermark at slot S is stored, no watermark
//! from an earlier slot is accepted until the address is removed.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::Amount;
use crate::ScanConfig;

/// Tick jitter tolerated when deciding whether an account is due.
const DUE_SLACK: Duration = Duration::from_millis(500);

/// Opaque position in an account's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Watermark {
    /// Account had no history when it was synced; track from now.
    Empty,
    /// Most recently observed transaction.
    Tx { signature: String, slot: u64 },
}

impl Watermark {
    pub fn tx(
        signature: impl Into<String>,
        slot: u64,
    ) -> Self {
        Watermark::Tx {
            signature: signature.into(),
            slot,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            Watermark::Empty => None,
            Watermark::Tx { signature, .. } => Some(signature),
        }
    }

    pub fn slot(&self) -> Option<u64> {
        match self {
            Watermark::Empty => None,
            Watermark::Tx { slot, .. } => Some(*slot),
        }
    }

    /// True when `self` lies strictly before `other` in history.
    pub fn is_older_than(
        &self,
        other: &Watermark,
    ) -> bool {
        match (self, other) {
            (Watermark::Empty, Watermark::Tx { .. }) => true,
            (Watermark::Tx { slot: a, .. }, Watermark::Tx { slot: b, .. }) => a < b,
            (_, Watermark::Empty) => false,
        }
    }
}

/// Activity metadata driving the adaptive poll cadence.
#[derive(Debug, Clone)]
pub struct AccountActivity {
    pub last_activity_at: Instant,
    pub poll_interval: Duration,
    /// When the last scan of this account started; `None` until first scan.
    pub last_checked_at: Option<Instant>,
    /// Last balance observed, used to compute balance deltas.
    pub last_balance: Option<Amount>,
}

#[derive(Debug, Clone)]
pub struct WatchedAccount {
    pub address: String,
    pub cursor: Option<Watermark>,
    /// The `Empty` cursor is a fallback set without reading the account's
    /// history; the next scan adopts the newest transaction as its starting
    /// point instead of reporting existing history.
    pub needs_baseline: bool,
    pub activity: AccountActivity,
}

/// Point-in-time view of one account, for status/health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CursorSnapshot {
    pub address: String,
    pub cursor: Option<Watermark>,
    pub poll_interval_ms: u64,
    pub idle_secs: u64,
}

pub struct CursorStore {
    accounts: RwLock<HashMap<String, WatchedAccount>>,
    config: ScanConfig,
}

impl CursorStore {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Starts tracking `address` with no cursor. Existing entries are kept.
    /// Returns true when the address was not tracked before.
    pub fn track(
        &self,
        address: &str,
    ) -> bool {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(address) {
            return false;
        }
        accounts.insert(address.to_string(), self.new_account(address));
        true
    }

    fn new_account(
        &self,
        address: &str,
    ) -> WatchedAccount {
        WatchedAccount {
            address: address.to_string(),
            cursor: None,
            needs_baseline: false,
            activity: AccountActivity {
                last_activity_at: Instant::now(),
                poll_interval: self.config.poll_interval(),
                last_checked_at: None,
                last_balance: None,
            },
        }
    }

    pub fn contains(
        &self,
        address: &str,
    ) -> bool {
        self.accounts.read().contains_key(address)
    }

    /// Returns the stored watermark; `None` when the address was never synced
    /// (or is not tracked at all).
    pub fn get(
        &self,
        address: &str,
    ) -> Option<Watermark> {
        self.accounts.read().get(address).and_then(|a| a.cursor.clone())
    }

    /// Moves the cursor forward to `watermark`.
    ///
    /// A watermark older than the stored one is ignored. An untracked address
    /// starts being tracked.
    pub fn advance(
        &self,
        address: &str,
        watermark: Watermark,
    ) {
        let mut accounts = self.accounts.write();
        let account = accounts
            .entry(address.to_string())
            .or_insert_with(|| self.new_account(address));

        match &account.cursor {
            Some(current) if watermark.is_older_than(current) => {
                debug!(
                    address,
                    ?current,
                    stale = ?watermark,
                    "ignoring stale watermark"
                );
            }
            _ => {
                trace!(address, ?watermark, "cursor advanced");
                account.cursor = Some(watermark);
                account.needs_baseline = false;
            }
        }
    }

    /// Records that `address` was synced and has no history. Never replaces a
    /// real transaction watermark.
    pub fn mark_empty(
        &self,
        address: &str,
    ) {
        self.advance(address, Watermark::Empty);
    }

    /// Sets the `Empty` cursor on an account whose sync did not complete.
    ///
    /// Unlike [`CursorStore::mark_empty`] the history was never read, so
    /// [`CursorStore::needs_baseline`] stays true until the next
    /// [`CursorStore::advance`]. Accounts that already have a cursor are left
    /// untouched.
    pub fn mark_empty_unsynced(
        &self,
        address: &str,
    ) {
        if let Some(account) = self.accounts.write().get_mut(address) {
            if account.cursor.is_none() {
                account.cursor = Some(Watermark::Empty);
                account.needs_baseline = true;
            }
        }
    }

    /// True when the cursor is a fallback `Empty` that was set without
    /// reading the account's history.
    pub fn needs_baseline(
        &self,
        address: &str,
    ) -> bool {
        self.accounts.read().get(address).is_some_and(|a| a.needs_baseline)
    }

    /// Stops tracking `address`, dropping its cursor and activity.
    pub fn remove(
        &self,
        address: &str,
    ) -> bool {
        self.accounts.write().remove(address).is_some()
    }

    /// Updates the activity state after a scan and returns the new poll
    /// interval.
    ///
    /// Activity resets the interval to the base; inactivity escalates it
    /// through the configured idle tiers. The interval never decreases while
    /// the account stays idle and never exceeds the ceiling.
    pub fn activity_hint(
        &self,
        address: &str,
        had_activity: bool,
    ) -> Duration {
        let now = Instant::now();
        let mut accounts = self.accounts.write();
        let Some(account) = accounts.get_mut(address) else {
            return self.config.poll_interval();
        };
        let activity = &mut account.activity;

        if had_activity {
            activity.last_activity_at = now;
            activity.poll_interval = self.config.poll_interval();
        } else {
            let idle = now.saturating_duration_since(activity.last_activity_at);
            let tier = self.config.interval_for_idle(idle);
            activity.poll_interval = activity
                .poll_interval
                .max(tier)
                .min(self.config.max_poll_interval());
        }

        activity.poll_interval
    }

    pub fn poll_interval(
        &self,
        address: &str,
    ) -> Option<Duration> {
        self.accounts.read().get(address).map(|a| a.activity.poll_interval)
    }

    /// Records that a scan of `address` was scheduled at `at`. Ticks pass
    /// their own start so the cadence does not drift by the time an account
    /// waited for a worker.
    pub fn mark_checked(
        &self,
        address: &str,
        at: Instant,
    ) {
        if let Some(account) = self.accounts.write().get_mut(address) {
            account.activity.last_checked_at = Some(at);
        }
    }

    pub fn last_balance(
        &self,
        address: &str,
    ) -> Option<Amount> {
        self.accounts.read().get(address).and_then(|a| a.activity.last_balance)
    }

    pub fn set_balance(
        &self,
        address: &str,
        balance: Amount,
    ) {
        if let Some(account) = self.accounts.write().get_mut(address) {
            account.activity.last_balance = Some(balance);
        }
    }

    /// Addresses whose poll interval has elapsed since their last check.
    pub fn due_accounts(
        &self,
        now: Instant,
    ) -> Vec<String> {
        self.accounts
            .read()
            .values()
            .filter(|a| match a.activity.last_checked_at {
                None => true,
                Some(checked) => {
                    now.saturating_duration_since(checked) + DUE_SLACK >= a.activity.poll_interval
                }
            })
            .map(|a| a.address.clone())
            .collect()
    }

    /// Tracked addresses that have never been synced.
    pub fn unsynced_accounts(&self) -> Vec<String> {
        self.accounts
            .read()
            .values()
            .filter(|a| a.cursor.is_none())
            .map(|a| a.address.clone())
            .collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.accounts.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<CursorSnapshot> {
        let now = Instant::now();
        self.accounts
            .read()
            .values()
            .map(|a| CursorSnapshot {
                address: a.address.clone(),
                cursor: a.cursor.clone(),
                poll_interval_ms: a.activity.poll_interval.as_millis() as u64,
                idle_secs: now.saturating_duration_since(a.activity.last_activity_at).as_secs(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}
