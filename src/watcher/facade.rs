//! Entry point composing the polling engine.
//!
//! A [`Watcher`] owns every component it uses; nothing is process-global, so
//! several independent watchers can live in one process.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::NotificationSink;
use super::SubscriberRegistry;
use super::SubscriptionSource;
use super::Unsubscribed;
use crate::spawn_task;
use crate::AccountEntry;
use crate::AlertCallback;
use crate::AlertLevel;
use crate::Amount;
use crate::BoundedExecutor;
use crate::CursorSnapshot;
use crate::CursorStore;
use crate::InProgressSet;
use crate::LedgerClient;
use crate::LimitStatus;
use crate::NotificationDedupCache;
use crate::ProcessSampler;
use crate::ResourceCounters;
use crate::ResourceKind;
use crate::ResourceLimitMonitor;
use crate::Result;
use crate::RetryingRpcAdapter;
use crate::ScanContext;
use crate::ScanScheduler;
use crate::SchedulerState;
use crate::SchedulerStatus;
use crate::SystemSampler;
use crate::TickOutcome;
use crate::WatcherConfig;
use crate::WatcherError;
use crate::WATCHED_ACCOUNTS;

const MAX_ADDRESS_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub address: String,
    /// Balance observed at registration, when it was fetched
    pub balance: Option<Amount>,
    /// The address was already scanned for another subscriber
    pub already_watched: bool,
    pub error: Option<String>,
}

/// Result of reconciling with the subscription source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub scheduler: SchedulerStatus,
    pub watched_accounts: usize,
    pub limits: Vec<LimitStatus>,
}

pub struct Watcher {
    config: WatcherConfig,
    pub(crate) cursors: Arc<CursorStore>,
    pub(crate) dedup: Arc<NotificationDedupCache>,
    pub(crate) adapter: Arc<RetryingRpcAdapter>,
    pub(crate) subscribers: Arc<SubscriberRegistry>,
    pub(crate) in_progress: InProgressSet,
    pub(crate) scheduler: Arc<ScanScheduler>,
    pub(crate) monitor: Arc<ResourceLimitMonitor>,
    source: Arc<dyn SubscriptionSource>,
    background: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Watcher {
    /// Validates `config` and wires every component. Nothing runs until
    /// [`Watcher::start`].
    pub fn new(
        config: WatcherConfig,
        client: Arc<dyn LedgerClient>,
        sink: Arc<dyn NotificationSink>,
        source: Arc<dyn SubscriptionSource>,
    ) -> Result<Self> {
        Self::with_sampler(config, client, sink, source, Arc::new(ProcessSampler::new()))
    }

    pub fn with_sampler(
        config: WatcherConfig,
        client: Arc<dyn LedgerClient>,
        sink: Arc<dyn NotificationSink>,
        source: Arc<dyn SubscriptionSource>,
        sampler: Arc<dyn SystemSampler>,
    ) -> Result<Self> {
        let config = config.validate()?;

        let counters = Arc::new(ResourceCounters::new());
        let cursors = Arc::new(CursorStore::new(config.scan.clone()));
        let dedup = Arc::new(NotificationDedupCache::new(config.dedup.max_entries));
        let adapter = Arc::new(RetryingRpcAdapter::new(
            client,
            counters.clone(),
            config.retry.clone(),
            config.scan.signature_limit,
        ));
        let subscribers = Arc::new(SubscriberRegistry::new());
        let in_progress = InProgressSet::new();

        let scheduler = Arc::new(ScanScheduler::new(
            ScanContext {
                cursors: cursors.clone(),
                dedup: dedup.clone(),
                adapter: adapter.clone(),
                subscribers: subscribers.clone(),
                sink,
                counters: counters.clone(),
                in_progress: in_progress.clone(),
            },
            config.scan.clone(),
            config.dedup.ttl(),
        ));

        let monitor = Arc::new(ResourceLimitMonitor::new(config.monitor.clone(), counters, sampler));
        {
            let cursors = cursors.clone();
            let dedup = dedup.clone();
            monitor.set_record_counter(Arc::new(move || cursors.len() + dedup.len()));
        }
        monitor.on_alert(Self::mitigation(dedup.clone()));

        Ok(Self {
            config,
            cursors,
            dedup,
            adapter,
            subscribers,
            in_progress,
            scheduler,
            monitor,
            source,
            background: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Sweeps expired dedup identifiers when memory or stored records turn
    /// critical.
    fn mitigation(dedup: Arc<NotificationDedupCache>) -> AlertCallback {
        Box::new(move |alert| {
            let pressure = matches!(
                alert.resource,
                ResourceKind::Memory | ResourceKind::StoredRecords
            );
            if alert.level == AlertLevel::Critical && pressure {
                let removed = dedup.sweep();
                warn!(resource = %alert.resource, removed, "critical pressure, dedup cache swept");
            }
        })
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Loads the subscription list, syncs cursors and starts the tick loop,
    /// the resource monitor and the background maintenance tasks.
    ///
    /// # Errors
    /// `WatcherError::AlreadyStarted` / `WatcherError::Stopped` when the
    /// watcher is not idle.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.scheduler.state() {
            SchedulerState::Idle => {}
            SchedulerState::Stopped => return Err(WatcherError::Stopped.into()),
            SchedulerState::Syncing | SchedulerState::Polling => {
                return Err(WatcherError::AlreadyStarted.into())
            }
        }

        match self.source.load().await {
            Ok(entries) => {
                for entry in entries {
                    if let Err(e) = self.track(&entry.address, &entry.subscriber_id) {
                        warn!(address = %entry.address, "skipping subscription: {}", e);
                    }
                }
            }
            Err(e) => error!("could not load subscriptions, starting empty: {}", e),
        }
        self.update_gauge();

        self.scheduler.start().await?;
        self.monitor.start()?;
        self.spawn_background();

        info!(accounts = self.cursors.len(), "watcher started");
        Ok(())
    }

    /// Stops scheduling, monitoring and maintenance. Cursors stay in memory.
    pub fn stop(&self) {
        self.scheduler.stop();
        self.monitor.stop();
        self.background.cancel();
        self.handles.lock().clear();
        info!("watcher stopped");
    }

    fn spawn_background(self: &Arc<Self>) {
        let mut handles = self.handles.lock();

        let dedup = self.dedup.clone();
        let every = self.config.dedup.sweep_interval();
        let token = self.background.clone();
        spawn_task(
            "dedup_sweeper",
            move || async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = ticker.tick() => {
                            dedup.sweep();
                        }
                    }
                }
            },
            Some(&mut *handles),
        );

        let refresh_ms = self.config.scan.subscription_refresh_interval_ms;
        if refresh_ms > 0 {
            let every = std::time::Duration::from_millis(refresh_ms);
            let watcher = Arc::downgrade(self);
            let token = self.background.clone();
            spawn_task(
                "subscription_refresh",
                move || async move {
                    let mut ticker = interval_at(Instant::now() + every, every);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return Ok(()),
                            _ = ticker.tick() => {
                                let Some(watcher) = watcher.upgrade() else {
                                    return Ok(());
                                };
                                if let Err(e) = watcher.sync_subscriptions().await {
                                    warn!("subscription refresh failed: {}", e);
                                }
                            }
                        }
                    }
                },
                Some(&mut *handles),
            );
        }
    }

    fn validate_address(address: &str) -> Result<()> {
        let valid = !address.is_empty()
            && address.len() <= MAX_ADDRESS_LEN
            && address.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(())
        } else {
            Err(WatcherError::InvalidAddress(address.to_string()).into())
        }
    }

    /// Adds the pair without any RPC. Returns true when the address is new.
    fn track(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> Result<bool> {
        Self::validate_address(address)?;
        Ok(self.subscribers.subscribe_with(address, subscriber_id, || {
            self.cursors.track(address);
        }))
    }

    /// Removes the pair; the last subscriber leaving drops the cursor while
    /// the registry entry is still held.
    fn untrack(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> Unsubscribed {
        self.subscribers.unsubscribe_with(address, subscriber_id, || {
            self.cursors.remove(address);
        })
    }

    fn update_gauge(&self) {
        WATCHED_ACCOUNTS.set(self.cursors.len() as i64);
    }

    /// Subscribes `subscriber_id` to `address`.
    ///
    /// A new address gets its cursor and balance from a retried snapshot;
    /// if every attempt fails the subscription is rolled back and the
    /// outcome reports the error.
    ///
    /// # Errors
    /// `WatcherError::InvalidAddress` for a malformed address,
    /// `WatcherError::Stopped` after [`Watcher::stop`].
    pub async fn register_account(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> Result<RegistrationOutcome> {
        if self.scheduler.state() == SchedulerState::Stopped {
            return Err(WatcherError::Stopped.into());
        }

        if !self.track(address, subscriber_id)? {
            debug!(address, subscriber_id, "address already watched");
            return Ok(RegistrationOutcome {
                success: true,
                address: address.to_string(),
                balance: self.cursors.last_balance(address),
                already_watched: true,
                error: None,
            });
        }
        self.update_gauge();

        let Some(_claim) = self.in_progress.try_acquire(address) else {
            debug!(address, "address being scanned, cursor will come from the scan");
            return Ok(RegistrationOutcome {
                success: true,
                address: address.to_string(),
                balance: None,
                already_watched: false,
                error: None,
            });
        };

        match self.adapter.registration_snapshot(address).await {
            Ok(snapshot) => {
                if self.cursors.contains(address) {
                    self.cursors.advance(address, snapshot.watermark);
                    self.cursors.set_balance(address, snapshot.balance);
                }
                info!(address, subscriber_id, "account registered");
                Ok(RegistrationOutcome {
                    success: true,
                    address: address.to_string(),
                    balance: Some(snapshot.balance),
                    already_watched: false,
                    error: None,
                })
            }
            Err(e) => {
                warn!(address, subscriber_id, "registration failed: {}", e);
                self.untrack(address, subscriber_id);
                self.update_gauge();
                Ok(RegistrationOutcome {
                    success: false,
                    address: address.to_string(),
                    balance: None,
                    already_watched: false,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// Removes one subscription. Returns true when the address is no longer
    /// watched by anyone and its cursor was dropped.
    pub fn unregister_account(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> Result<bool> {
        match self.untrack(address, subscriber_id) {
            Unsubscribed::NotRegistered => Err(WatcherError::NotRegistered {
                address: address.to_string(),
                subscriber_id: subscriber_id.to_string(),
            }
            .into()),
            Unsubscribed::Shared => Ok(false),
            Unsubscribed::Last => {
                self.update_gauge();
                info!(address, "address no longer watched");
                Ok(true)
            }
        }
    }

    /// Reconciles with the subscription source: pairs it no longer lists are
    /// unregistered, new pairs are registered.
    pub async fn sync_subscriptions(&self) -> Result<SyncReport> {
        let desired: HashSet<(String, String)> = self
            .source
            .load()
            .await?
            .into_iter()
            .map(|e| (e.address, e.subscriber_id))
            .collect();
        let current: HashSet<(String, String)> = self
            .subscribers
            .entries()
            .into_iter()
            .map(|e| (e.address, e.subscriber_id))
            .collect();

        let mut report = SyncReport::default();
        for (address, subscriber_id) in current.difference(&desired) {
            if self.unregister_account(address, subscriber_id).is_ok() {
                report.removed += 1;
            }
        }

        let additions: Vec<AccountEntry> = desired
            .difference(&current)
            .map(|(address, subscriber_id)| AccountEntry {
                address: address.clone(),
                subscriber_id: subscriber_id.clone(),
            })
            .collect();
        let outcome = BoundedExecutor::new(self.config.scan.concurrency)
            .run(additions, |entry| async move {
                match self.register_account(&entry.address, &entry.subscriber_id).await {
                    Ok(outcome) if outcome.success => Ok(()),
                    Ok(outcome) => Err(outcome.error.unwrap_or_default()),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;
        report.added = outcome.succeeded;
        report.failed = outcome.failed;

        if report != SyncReport::default() {
            info!(?report, "subscriptions reconciled");
        }
        Ok(report)
    }

    /// Runs one tick now, subject to the same non-overlap guard as the loop.
    pub async fn check_now(&self) -> Result<TickOutcome> {
        if self.scheduler.state() == SchedulerState::Stopped {
            return Err(WatcherError::Stopped.into());
        }
        Ok(self.scheduler.run_tick().await)
    }

    pub fn on_alert(
        &self,
        callback: AlertCallback,
    ) {
        self.monitor.on_alert(callback);
    }

    pub fn reset_alerts(&self) {
        self.monitor.reset_alerts();
    }

    pub fn track_outbound_message(&self) {
        self.monitor.track_outbound_message();
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            scheduler: self.scheduler.status(),
            watched_accounts: self.cursors.len(),
            limits: self.monitor.get_status(),
        }
    }

    pub fn cursors(&self) -> Vec<CursorSnapshot> {
        self.cursors.snapshot()
    }

    pub fn subscribers_of(
        &self,
        address: &str,
    ) -> Vec<String> {
        self.subscribers.subscribers(address)
    }

    pub fn live_timers(&self) -> usize {
        self.adapter.live_timers()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.background.cancel();
        self.scheduler.stop();
        self.monitor.stop();
    }
}
