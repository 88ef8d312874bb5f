//! Prometheus collectors and the `/metrics` + `/health` exporter.

use std::sync::Arc;
use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::GaugeVec;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::WatcherStatus;

lazy_static! {
    pub static ref SCAN_TICKS: IntCounterVec = IntCounterVec::new(
        Opts::new("scan_ticks", "Scheduler ticks by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref ACCOUNT_SCANS: IntCounterVec = IntCounterVec::new(
        Opts::new("account_scans", "Per-account scans by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref RPC_CALL_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rpc_call_latency_ms", "Histogram of ledger RPC latency in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["method"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("notifications", "Notification deliveries by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref RESOURCE_ALERTS: IntCounterVec = IntCounterVec::new(
        Opts::new("resource_alerts", "Resource limit alerts raised"),
        &["resource", "level"]
    )
    .expect("metric can not be created");

    pub static ref RESOURCE_USAGE_PERCENT: GaugeVec = GaugeVec::new(
        Opts::new("resource_usage_percent", "Last sampled usage of each resource limit"),
        &["resource"]
    )
    .expect("metric can not be created");

    pub static ref WATCHED_ACCOUNTS: IntGauge =
        IntGauge::new("watched_accounts", "Distinct addresses being watched")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SCAN_TICKS.clone()),
        Box::new(ACCOUNT_SCANS.clone()),
        Box::new(RPC_CALL_LATENCY_MS.clone()),
        Box::new(NOTIFICATIONS.clone()),
        Box::new(RESOURCE_ALERTS.clone()),
        Box::new(RESOURCE_USAGE_PERCENT.clone()),
        Box::new(WATCHED_ACCOUNTS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

/// Returned by the `/health` route.
pub type HealthProvider = Arc<dyn Fn() -> WatcherStatus + Send + Sync>;

pub async fn start_server(
    port: u16,
    health: HealthProvider,
    mut shutdown_signal: watch::Receiver<()>,
) {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let health_route = warp::path!("health").map(move || warp::reply::json(&health()));

    info!(port, "metrics exporter listening");
    let (_, server) = warp::serve(metrics_route.or(health_route)).bind_with_graceful_shutdown(
        ([0, 0, 0, 0], port),
        async move {
            let _ = shutdown_signal.changed().await;
        },
    );
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

pub(crate) fn encode_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
