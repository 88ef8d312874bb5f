use std::sync::Arc;

use ledger_watcher::start_server;
use ledger_watcher::Error;
use ledger_watcher::HealthProvider;
use ledger_watcher::JsonRpcLedgerClient;
use ledger_watcher::LoggingSink;
use ledger_watcher::Result;
use ledger_watcher::StaticSubscriptions;
use ledger_watcher::Watcher;
use ledger_watcher::WatcherConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Directory for rolling log files; logs go to stdout when unset.
const LOG_DIR_ENV: &str = "WATCHER_LOG_DIR";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = WatcherConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability()?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let client = Arc::new(JsonRpcLedgerClient::new(&config.rpc)?);
    let source = Arc::new(StaticSubscriptions::new(config.accounts.clone()));
    let exporter = config.exporter.clone();
    let watcher = Arc::new(Watcher::new(config, client, Arc::new(LoggingSink), source)?);

    watcher.start().await?;

    if exporter.enabled {
        let health_watcher = watcher.clone();
        let health: HealthProvider = Arc::new(move || health_watcher.status());
        tokio::spawn(start_server(exporter.port, health, graceful_rx));
    }

    info!("Watcher started. Waiting for CTRL+C signal...");
    if let Err(e) = graceful_shutdown(graceful_tx).await {
        error!("Failed to shutdown: {:?}", e);
    }

    watcher.stop();
    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("cannot listen for SIGINT: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("cannot listen for SIGTERM: {e}")))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() -> Result<WorkerGuard> {
    let (non_blocking, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::Fatal(format!("cannot create log dir {dir}: {e}")))?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "watcher.log"))
        }
        Err(_) => tracing_appender::non_blocking(std::io::stdout()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(filter);
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
