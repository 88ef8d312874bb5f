//! Shared fakes for unit tests: an instrumented in-memory ledger and a
//! recording notification sink.
mod fake_ledger;
mod recording_sink;

pub use fake_ledger::*;
pub use recording_sink::*;

use crate::WatcherConfig;

/// Initializes a test subscriber once; repeated calls are ignored.
pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default configuration with the given fan-out.
pub fn test_config(concurrency: usize) -> WatcherConfig {
    let mut config = WatcherConfig::default();
    config.scan.concurrency = concurrency;
    config
}
