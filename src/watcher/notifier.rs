//! Events handed to the notification channel.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::info;

use crate::Amount;
use crate::Result;
use crate::SignatureInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A transaction touching the watched account.
    Transaction {
        signature: String,
        slot: u64,
        failed: bool,
        block_time: Option<i64>,
    },
    /// Net balance movement observed across the newest transactions.
    BalanceChange {
        previous: Amount,
        current: Amount,
        delta: Amount,
        direction: TransferDirection,
        /// Newest transaction at the time the balance was read
        signature: String,
    },
}

/// A detected change not yet delivered, keyed by its dedup identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEvent {
    pub id: String,
    pub address: String,
    pub subscribers: Vec<String>,
    pub kind: EventKind,
}

impl PendingEvent {
    pub fn transaction(
        address: &str,
        subscribers: Vec<String>,
        tx: &SignatureInfo,
    ) -> Self {
        Self {
            id: format!("{address}:tx:{}", tx.signature),
            address: address.to_string(),
            subscribers,
            kind: EventKind::Transaction {
                signature: tx.signature.clone(),
                slot: tx.slot,
                failed: tx.failed,
                block_time: tx.block_time,
            },
        }
    }

    /// `None` when the balance did not move.
    pub fn balance_change(
        address: &str,
        subscribers: Vec<String>,
        previous: Amount,
        current: Amount,
        newest_signature: &str,
    ) -> Option<Self> {
        let (direction, delta) = match current.cmp(&previous) {
            std::cmp::Ordering::Greater => (TransferDirection::Incoming, current - previous),
            std::cmp::Ordering::Less => (TransferDirection::Outgoing, previous - current),
            std::cmp::Ordering::Equal => return None,
        };

        Some(Self {
            id: format!("{address}:balance:{newest_signature}"),
            address: address.to_string(),
            subscribers,
            kind: EventKind::BalanceChange {
                previous,
                current,
                delta,
                direction,
                signature: newest_signature.to_string(),
            },
        })
    }
}

/// Notification channel collaborator.
///
/// `Ok` means the event was accepted; only then is it marked as seen.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(
        &self,
        event: PendingEvent,
    ) -> Result<()>;
}

/// Writes every event to the log. Used by the daemon when no chat channel
/// is wired in.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(
        &self,
        event: PendingEvent,
    ) -> Result<()> {
        let payload = serde_json::to_string(&event.kind)
            .map_err(|e| crate::Error::Notification(e.to_string()))?;
        info!(
            event_id = %event.id,
            address = %event.address,
            subscribers = ?event.subscribers,
            %payload,
            "account activity"
        );
        Ok(())
    }
}
