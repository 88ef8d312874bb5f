//! JSON-RPC 2.0 ledger client over HTTP.
//!
//! Speaks the Solana-style `getBalance` / `getSignaturesForAddress` methods.
//! The client performs a single request per call; the adapter layers hard
//! timeouts and registration retries on top.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use super::Amount;
use super::LedgerClient;
use super::SignatureInfo;
use crate::RpcConfig;
use crate::RpcError;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: Amount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureEntry {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    block_time: Option<i64>,
}

impl From<SignatureEntry> for SignatureInfo {
    fn from(entry: SignatureEntry) -> Self {
        SignatureInfo {
            signature: entry.signature,
            slot: entry.slot,
            failed: entry.err.is_some_and(|e| !e.is_null()),
            block_time: entry.block_time,
        }
    }
}

pub struct JsonRpcLedgerClient {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    pub fn new(config: &RpcConfig) -> std::result::Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> std::result::Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "sending JSON-RPC request");
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!("{method}: HTTP {status}")));
        }

        let text = response.text().await?;
        decode_response(method, &text)
    }
}

pub(crate) fn decode_response<T: DeserializeOwned>(
    method: &'static str,
    text: &str,
) -> std::result::Result<T, RpcError> {
    let envelope: RpcResponse<T> = serde_json::from_str(text)
        .map_err(|e| RpcError::InvalidResponse(format!("{method}: {e}")))?;

    if let Some(err) = envelope.error {
        return Err(RpcError::Provider {
            code: err.code,
            message: err.message,
        });
    }

    envelope
        .result
        .ok_or_else(|| RpcError::InvalidResponse(format!("{method}: missing result")))
}

#[cfg(test)]
pub(crate) fn decode_balance(text: &str) -> std::result::Result<Amount, RpcError> {
    decode_response::<BalanceResult>("getBalance", text).map(|r| r.value)
}

#[cfg(test)]
pub(crate) fn decode_signatures(text: &str) -> std::result::Result<Vec<SignatureInfo>, RpcError> {
    decode_response::<Vec<SignatureEntry>>("getSignaturesForAddress", text)
        .map(|entries| entries.into_iter().map(SignatureInfo::from).collect())
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn get_balance(
        &self,
        address: String,
    ) -> std::result::Result<Amount, RpcError> {
        let result: BalanceResult = self.call("getBalance", json!([address])).await?;
        Ok(result.value)
    }

    async fn get_signatures_since(
        &self,
        address: String,
        until: Option<String>,
        limit: usize,
    ) -> std::result::Result<Vec<SignatureInfo>, RpcError> {
        let mut options = json!({ "limit": limit });
        if let Some(until) = until {
            options["until"] = Value::String(until);
        }
        let entries: Vec<SignatureEntry> = self
            .call("getSignaturesForAddress", json!([address, options]))
            .await?;
        Ok(entries.into_iter().map(SignatureInfo::from).collect())
    }
}
