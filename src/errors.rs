//! Watcher Error Hierarchy
//!
//! Defines the error types surfaced by the polling engine, grouped by the
//! layer that produces them: configuration, the remote ledger RPC boundary and
//! the watcher lifecycle itself.
//!
//! A single account's fetch failure is never propagated out of a scan batch;
//! these types travel only as far as the scan task that logs them, or back to
//! the caller of a registration/lifecycle operation.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or range validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote ledger call failures (transport, provider, timeout)
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Watcher lifecycle and registration failures
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    /// Notification channel rejected a delivery
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Hard timeout elapsed before the provider answered
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Connection or HTTP level failures
    #[error("RPC transport failure: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the provider
    #[error("RPC provider error {code}: {message}")]
    Provider { code: i64, message: String },

    /// Provider answered with a payload we could not interpret
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Retry policy exhaustion
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: usize,
        last_error: String,
    },
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Invalid account address: {0:?}")]
    InvalidAddress(String),

    #[error("Watcher already started")]
    AlreadyStarted,

    #[error("Watcher has been stopped")]
    Stopped,

    #[error("Subscriber {subscriber_id} is not registered for {address}")]
    NotRegistered {
        address: String,
        subscriber_id: String,
    },
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RpcError::InvalidResponse(e.to_string())
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Rpc(e.into())
    }
}

impl Error {
    /// Returns true when the underlying cause is an RPC hard timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Rpc(e) if e.is_timeout())
    }
}
