use std::time::Duration;

use ::config::ConfigError;

use super::*;

#[test]
fn test_error_fatal() {
    let err = Error::Fatal("critical failure".to_string());
    assert_eq!(err.to_string(), "Fatal error: critical failure");
}

#[test]
fn test_rpc_error_timeout() {
    let err = RpcError::Timeout {
        operation: "getBalance",
        duration: Duration::from_secs(3),
    };
    let msg = err.to_string();
    assert!(msg.contains("getBalance"));
    assert!(msg.contains("3s"));
    assert!(err.is_timeout());
}

#[test]
fn test_rpc_error_retries_exhausted() {
    let err = RpcError::RetriesExhausted {
        operation: "snapshot",
        attempts: 3,
        last_error: "connection reset".to_string(),
    };
    assert_eq!(err.to_string(), "snapshot failed after 3 attempts: connection reset");
    assert!(!err.is_timeout());
}

#[test]
fn test_rpc_error_provider() {
    let err = RpcError::Provider {
        code: -32005,
        message: "rate limited".to_string(),
    };
    assert_eq!(err.to_string(), "RPC provider error -32005: rate limited");
}

#[test]
fn test_error_from_rpc_error_keeps_timeout_classification() {
    let err: Error = RpcError::Timeout {
        operation: "getSignaturesForAddress",
        duration: Duration::from_millis(100),
    }
    .into();
    assert!(err.is_timeout());

    let err: Error = RpcError::Transport("refused".to_string()).into();
    assert!(!err.is_timeout());
}

#[test]
fn test_watcher_error_not_registered() {
    let err: Error = WatcherError::NotRegistered {
        address: "addr1".to_string(),
        subscriber_id: "chat-7".to_string(),
    }
    .into();
    let msg = err.to_string();
    assert!(msg.contains("addr1"));
    assert!(msg.contains("chat-7"));
}

#[test]
fn test_config_error_is_transparent() {
    let err: Error = ConfigError::Message("poll_interval_ms too small".to_string()).into();
    assert_eq!(err.to_string(), "poll_interval_ms too small");
}
