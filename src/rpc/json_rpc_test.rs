use super::json_rpc::*;
use crate::RpcConfig;
use crate::RpcError;

#[test]
fn test_decode_balance() {
    let text = r#"{"jsonrpc":"2.0","result":{"context":{"slot":1},"value":1500000000},"id":1}"#;
    assert_eq!(decode_balance(text).unwrap(), 1_500_000_000);
}

#[test]
fn test_decode_signatures_marks_failed_transactions() {
    let text = r#"{"jsonrpc":"2.0","id":2,"result":[
        {"signature":"sigB","slot":120,"err":{"InstructionError":[0,"Custom"]},"blockTime":1700000100,"memo":null},
        {"signature":"sigA","slot":110,"err":null,"blockTime":null}
    ]}"#;

    let sigs = decode_signatures(text).unwrap();
    assert_eq!(sigs.len(), 2);
    assert_eq!(sigs[0].signature, "sigB");
    assert!(sigs[0].failed);
    assert_eq!(sigs[0].block_time, Some(1_700_000_100));
    assert_eq!(sigs[1].slot, 110);
    assert!(!sigs[1].failed);
    assert_eq!(sigs[1].block_time, None);
}

#[test]
fn test_decode_provider_error() {
    let text = r#"{"jsonrpc":"2.0","error":{"code":-32005,"message":"Too many requests"},"id":3}"#;
    match decode_balance(text) {
        Err(RpcError::Provider { code, message }) => {
            assert_eq!(code, -32005);
            assert_eq!(message, "Too many requests");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_decode_missing_result() {
    let text = r#"{"jsonrpc":"2.0","id":4}"#;
    assert!(matches!(decode_signatures(text), Err(RpcError::InvalidResponse(_))));
}

#[test]
fn test_decode_garbage() {
    assert!(matches!(decode_balance("<html>"), Err(RpcError::InvalidResponse(_))));
}

#[test]
fn test_client_builds_from_config() {
    let config = RpcConfig::default();
    assert!(JsonRpcLedgerClient::new(&config).is_ok());
}
