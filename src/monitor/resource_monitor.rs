//! Periodic resource sampling with edge-triggered alerts.
//!
//! Each monitor owns its limits, its callbacks and its sampling task, so
//! several monitors can run side by side in one process.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::AlertLevel;
use super::LimitStatus;
use super::ResourceAlert;
use super::ResourceCounters;
use super::ResourceKind;
use super::ResourceLimit;
use super::SystemSampler;
use super::Thresholds;
use crate::ResourceMonitorConfig;
use crate::Result;
use crate::WatcherError;
use crate::RESOURCE_ALERTS;
use crate::RESOURCE_USAGE_PERCENT;

pub type AlertCallback = Box<dyn Fn(&ResourceAlert) + Send + Sync>;

/// Reports how many records (cursors, dedup ids) the process currently holds.
pub type RecordCountProvider = Arc<dyn Fn() -> usize + Send + Sync>;

pub struct ResourceLimitMonitor {
    config: ResourceMonitorConfig,
    limits: Mutex<Vec<ResourceLimit>>,
    callbacks: RwLock<Vec<AlertCallback>>,
    counters: Arc<ResourceCounters>,
    sampler: Arc<dyn SystemSampler>,
    record_counter: RwLock<Option<RecordCountProvider>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl ResourceLimitMonitor {
    pub fn new(
        config: ResourceMonitorConfig,
        counters: Arc<ResourceCounters>,
        sampler: Arc<dyn SystemSampler>,
    ) -> Self {
        let thresholds = Thresholds {
            warning_percent: config.warning_percent,
            critical_percent: config.critical_percent,
        };
        let limits = ResourceKind::ALL
            .iter()
            .map(|kind| ResourceLimit::new(*kind, Self::max_for(&config, *kind), thresholds))
            .collect();

        Self {
            config,
            limits: Mutex::new(limits),
            callbacks: RwLock::new(Vec::new()),
            counters,
            sampler,
            record_counter: RwLock::new(None),
            shutdown: Mutex::new(None),
        }
    }

    fn max_for(
        config: &ResourceMonitorConfig,
        kind: ResourceKind,
    ) -> f64 {
        let max = match kind {
            ResourceKind::RpcRate => config.max_rpc_per_minute,
            ResourceKind::Memory => config.max_memory_mb,
            ResourceKind::Cpu => config.max_cpu_percent,
            ResourceKind::OutboundRate => config.max_outbound_per_minute,
            ResourceKind::StoredRecords => config.max_stored_records,
        };
        max as f64
    }

    pub fn set_record_counter(
        &self,
        provider: RecordCountProvider,
    ) {
        *self.record_counter.write() = Some(provider);
    }

    pub fn on_alert(
        &self,
        callback: AlertCallback,
    ) {
        self.callbacks.write().push(callback);
    }

    pub fn track_rpc_request(&self) {
        self.counters.track_rpc_request();
    }

    pub fn track_outbound_message(&self) {
        self.counters.track_outbound_message();
    }

    pub fn counters(&self) -> Arc<ResourceCounters> {
        self.counters.clone()
    }

    /// Spawns the sampling task.
    ///
    /// # Errors
    /// `WatcherError::AlreadyStarted` when the task is already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let token = {
            let mut shutdown = self.shutdown.lock();
            if shutdown.is_some() {
                return Err(WatcherError::AlreadyStarted.into());
            }
            let token = CancellationToken::new();
            *shutdown = Some(token.clone());
            token
        };

        let every = self.config.check_interval();
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("resource monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        monitor.sample();
                    }
                }
            }
        });

        info!(interval = ?every, "resource monitor started");
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    fn read_current(
        &self,
        kind: ResourceKind,
    ) -> f64 {
        match kind {
            ResourceKind::RpcRate => self.counters.rpc_per_minute() as f64,
            ResourceKind::Memory => self.sampler.memory_mb(),
            ResourceKind::Cpu => self.sampler.cpu_percent(),
            ResourceKind::OutboundRate => self.counters.outbound_per_minute() as f64,
            ResourceKind::StoredRecords => self
                .record_counter
                .read()
                .as_ref()
                .map_or(0.0, |count| count() as f64),
        }
    }

    /// Runs one sampling tick and invokes callbacks for every alert raised.
    pub fn sample(&self) -> Vec<ResourceAlert> {
        let readings: Vec<(ResourceKind, f64)> = ResourceKind::ALL
            .iter()
            .map(|kind| (*kind, self.read_current(*kind)))
            .collect();

        let now = Instant::now();
        let cooldown = self.config.alert_cooldown();
        let alerts: Vec<ResourceAlert> = {
            let mut limits = self.limits.lock();
            limits
                .iter_mut()
                .zip(readings)
                .filter_map(|(limit, (_, current))| {
                    let alert = limit.observe(current, now, cooldown);
                    RESOURCE_USAGE_PERCENT
                        .with_label_values(&[limit.resource.name()])
                        .set(limit.percentage());
                    alert
                })
                .collect()
        };

        for alert in &alerts {
            RESOURCE_ALERTS
                .with_label_values(&[alert.resource.name(), alert.level.as_str()])
                .inc();
            match alert.level {
                AlertLevel::Critical => error!(
                    resource = %alert.resource,
                    percentage = alert.percentage,
                    "resource limit critical"
                ),
                _ => warn!(
                    resource = %alert.resource,
                    percentage = alert.percentage,
                    "resource limit warning"
                ),
            }
            self.notify(alert);
        }

        alerts
    }

    fn notify(
        &self,
        alert: &ResourceAlert,
    ) {
        for callback in self.callbacks.read().iter() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                error!(resource = %alert.resource, "alert callback panicked");
            }
        }
    }

    pub fn get_status(&self) -> Vec<LimitStatus> {
        self.limits.lock().iter().map(ResourceLimit::status).collect()
    }

    /// Clears every limit's last-alert state.
    pub fn reset_alerts(&self) {
        for limit in self.limits.lock().iter_mut() {
            limit.reset_alert();
        }
        info!("resource alerts reset");
    }
}
