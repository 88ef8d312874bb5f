//! Address to subscriber bookkeeping and the persistent-store collaborator.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;

use crate::AccountEntry;
use crate::Result;

/// Result of removing one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The pair was not registered.
    NotRegistered,
    /// Other subscribers still watch the address.
    Shared,
    /// The last subscriber left; the address is no longer watched.
    Last,
}

/// Which subscribers watch which address. Each address is scanned once no
/// matter how many subscribers watch it.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    by_address: DashMap<String, BTreeSet<String>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `address` had no subscriber before.
    pub fn subscribe(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> bool {
        self.subscribe_with(address, subscriber_id, || {})
    }

    /// Like [`SubscriberRegistry::subscribe`], running `on_first` while the
    /// address entry is still locked when this is its first subscriber.
    ///
    /// `on_first` must not call back into the registry.
    pub fn subscribe_with<F>(
        &self,
        address: &str,
        subscriber_id: &str,
        on_first: F,
    ) -> bool
    where
        F: FnOnce(),
    {
        let mut subscribers = self.by_address.entry(address.to_string()).or_default();
        let first = subscribers.is_empty();
        subscribers.insert(subscriber_id.to_string());
        if first {
            on_first();
        }
        first
    }

    pub fn unsubscribe(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> Unsubscribed {
        self.unsubscribe_with(address, subscriber_id, || {})
    }

    /// Like [`SubscriberRegistry::unsubscribe`], running `on_last` while the
    /// address entry is still locked when the last subscriber leaves.
    ///
    /// `on_last` must not call back into the registry.
    pub fn unsubscribe_with<F>(
        &self,
        address: &str,
        subscriber_id: &str,
        on_last: F,
    ) -> Unsubscribed
    where
        F: FnOnce(),
    {
        let Entry::Occupied(mut entry) = self.by_address.entry(address.to_string()) else {
            return Unsubscribed::NotRegistered;
        };
        if !entry.get_mut().remove(subscriber_id) {
            return Unsubscribed::NotRegistered;
        }
        if !entry.get().is_empty() {
            return Unsubscribed::Shared;
        }
        on_last();
        entry.remove();
        Unsubscribed::Last
    }

    pub fn is_subscribed(
        &self,
        address: &str,
        subscriber_id: &str,
    ) -> bool {
        self.by_address
            .get(address)
            .is_some_and(|subscribers| subscribers.contains(subscriber_id))
    }

    pub fn subscribers(
        &self,
        address: &str,
    ) -> Vec<String> {
        self.by_address
            .get(address)
            .map(|subscribers| subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> Vec<AccountEntry> {
        self.by_address
            .iter()
            .flat_map(|entry| {
                let address = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|subscriber_id| AccountEntry {
                        address: address.clone(),
                        subscriber_id: subscriber_id.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }
}

/// Persistent store collaborator supplying `{address, subscriber}` pairs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionSource: Send + Sync + 'static {
    async fn load(&self) -> Result<Vec<AccountEntry>>;
}

/// Fixed subscription list, e.g. from the `accounts` configuration section.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriptions {
    entries: Vec<AccountEntry>,
}

impl StaticSubscriptions {
    pub fn new(entries: Vec<AccountEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl SubscriptionSource for StaticSubscriptions {
    async fn load(&self) -> Result<Vec<AccountEntry>> {
        Ok(self.entries.clone())
    }
}
