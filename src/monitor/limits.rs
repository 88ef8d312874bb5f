//! Thresholded resource limits and their alert state.
//!
//! Alert state only moves forward (`ok -> warning -> critical`) and resets
//! when the resource is sampled back at `ok`. Repeating an alert at the same
//! or a lower level waits for the cooldown.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Ok => "ok",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    RpcRate,
    Memory,
    Cpu,
    OutboundRate,
    StoredRecords,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::RpcRate,
        ResourceKind::Memory,
        ResourceKind::Cpu,
        ResourceKind::OutboundRate,
        ResourceKind::StoredRecords,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::RpcRate => "rpc_rate",
            ResourceKind::Memory => "memory",
            ResourceKind::Cpu => "cpu",
            ResourceKind::OutboundRate => "outbound_rate",
            ResourceKind::StoredRecords => "stored_records",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::RpcRate | ResourceKind::OutboundRate => "per_minute",
            ResourceKind::Memory => "MB",
            ResourceKind::Cpu => "percent",
            ResourceKind::StoredRecords => "records",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub warning_percent: f64,
    pub critical_percent: f64,
}

impl Thresholds {
    pub fn classify(
        &self,
        percentage: f64,
    ) -> AlertLevel {
        if percentage >= self.critical_percent {
            AlertLevel::Critical
        } else if percentage >= self.warning_percent {
            AlertLevel::Warning
        } else {
            AlertLevel::Ok
        }
    }
}

/// Payload handed to alert callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAlert {
    pub resource: ResourceKind,
    pub level: AlertLevel,
    pub current: f64,
    pub max: f64,
    pub percentage: f64,
    pub unit: &'static str,
}

#[derive(Debug, Clone)]
pub struct ResourceLimit {
    pub resource: ResourceKind,
    pub current: f64,
    pub max: f64,
    pub thresholds: Thresholds,
    pub last_alert_level: AlertLevel,
    pub last_alert_at: Option<Instant>,
}

impl ResourceLimit {
    pub fn new(
        resource: ResourceKind,
        max: f64,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            resource,
            current: 0.0,
            max,
            thresholds,
            last_alert_level: AlertLevel::Ok,
            last_alert_at: None,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.max <= 0.0 {
            return 0.0;
        }
        self.current / self.max * 100.0
    }

    pub fn level(&self) -> AlertLevel {
        self.thresholds.classify(self.percentage())
    }

    /// Records a new sample and returns the alert to raise, if any.
    pub fn observe(
        &mut self,
        current: f64,
        now: Instant,
        cooldown: Duration,
    ) -> Option<ResourceAlert> {
        self.current = current;
        let level = self.level();

        if level == AlertLevel::Ok {
            self.last_alert_level = AlertLevel::Ok;
            return None;
        }

        let escalated = level > self.last_alert_level;
        let cooled_down = self
            .last_alert_at
            .map_or(true, |at| now.saturating_duration_since(at) >= cooldown);

        if !escalated && !cooled_down {
            return None;
        }

        self.last_alert_level = level;
        self.last_alert_at = Some(now);
        Some(ResourceAlert {
            resource: self.resource,
            level,
            current,
            max: self.max,
            percentage: self.percentage(),
            unit: self.resource.unit(),
        })
    }

    pub fn reset_alert(&mut self) {
        self.last_alert_level = AlertLevel::Ok;
        self.last_alert_at = None;
    }

    pub fn status(&self) -> LimitStatus {
        LimitStatus {
            limit: self.resource,
            current: self.current,
            max: self.max,
            unit: self.resource.unit(),
            percentage: self.percentage(),
            status: self.level(),
        }
    }
}

/// Health view of one resource limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitStatus {
    pub limit: ResourceKind,
    pub current: f64,
    pub max: f64,
    pub unit: &'static str,
    pub percentage: f64,
    pub status: AlertLevel,
}
