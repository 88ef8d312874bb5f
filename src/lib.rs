//! Incremental account-watching engine.
//!
//! Polls a remote ledger for per-account activity, keeping each account's
//! cursor, a non-overlapping tick schedule with bounded RPC fan-out,
//! notification dedup and resource-limit alerting.
//!
//! ```ignore
//! let config = WatcherConfig::new()?.validate()?;
//! let client = Arc::new(JsonRpcLedgerClient::new(&config.rpc)?);
//! let source = Arc::new(StaticSubscriptions::new(config.accounts.clone()));
//! let watcher = Arc::new(Watcher::new(config, client, Arc::new(LoggingSink), source)?);
//! watcher.start().await?;
//! ```
mod config;
mod errors;
mod metrics;
mod monitor;
mod rpc;
mod scheduler;
mod storage;
mod watcher;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use monitor::*;
pub use rpc::*;
pub use scheduler::*;
pub use storage::*;
pub use utils::*;
pub use watcher::*;

#[cfg(test)]
mod errors_test;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
