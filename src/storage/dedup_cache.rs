//! Notification dedup cache.
//!
//! Time-bounded set of event identifiers already handed to the notification
//! sink. Expiry is checked lazily on read; [`NotificationDedupCache::sweep`]
//! removes expired identifiers that are never read again.
//!
//! # Design
//!
//! - Uses monotonic `Instant` expiry (the cache does not survive restarts)
//! - Two-way index: expiry→ids for sweeping and eviction, id→expiry for lookups
//! - `max_entries` caps memory; the soonest-expiring ids are evicted first

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct DedupIndex {
    /// expiry -> ids expiring at that instant
    expirations: BTreeMap<Instant, Vec<String>>,
    /// id -> expiry
    id_to_expiry: HashMap<String, Instant>,
}

impl DedupIndex {
    fn unregister(
        &mut self,
        id: &str,
    ) {
        if let Some(expire_at) = self.id_to_expiry.remove(id) {
            if let Some(ids) = self.expirations.get_mut(&expire_at) {
                ids.retain(|k| k != id);
                if ids.is_empty() {
                    self.expirations.remove(&expire_at);
                }
            }
        }
    }

    fn remove_expired(
        &mut self,
        now: Instant,
    ) -> usize {
        let expired_times: Vec<Instant> =
            self.expirations.range(..=now).map(|(time, _)| *time).collect();

        let mut removed = 0;
        for time in expired_times {
            if let Some(ids) = self.expirations.remove(&time) {
                for id in &ids {
                    self.id_to_expiry.remove(id);
                }
                removed += ids.len();
            }
        }
        removed
    }

    fn evict_soonest(&mut self) -> bool {
        let Some(mut entry) = self.expirations.first_entry() else {
            return false;
        };
        let ids = entry.get_mut();
        let victim = ids.pop();
        if ids.is_empty() {
            entry.remove();
        }
        match victim {
            Some(id) => {
                self.id_to_expiry.remove(&id);
                true
            }
            None => false,
        }
    }
}

pub struct NotificationDedupCache {
    index: Mutex<DedupIndex>,
    max_entries: usize,
}

impl NotificationDedupCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            index: Mutex::new(DedupIndex::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// True while `event_id` was marked seen and its TTL has not elapsed.
    /// An expired identifier is dropped on the way out.
    pub fn has_seen(
        &self,
        event_id: &str,
    ) -> bool {
        let now = Instant::now();
        let mut index = self.index.lock();
        match index.id_to_expiry.get(event_id).copied() {
            Some(expire_at) if expire_at > now => true,
            Some(_) => {
                index.unregister(event_id);
                false
            }
            None => false,
        }
    }

    /// Marks `event_id` as delivered for `ttl`. Re-marking refreshes the TTL.
    pub fn mark_seen(
        &self,
        event_id: &str,
        ttl: Duration,
    ) {
        let expire_at = Instant::now() + ttl;
        let mut index = self.index.lock();

        index.unregister(event_id);
        while index.id_to_expiry.len() >= self.max_entries {
            if !index.evict_soonest() {
                break;
            }
        }

        index.expirations.entry(expire_at).or_default().push(event_id.to_string());
        index.id_to_expiry.insert(event_id.to_string(), expire_at);
    }

    /// Removes every expired identifier. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.index.lock().remove_expired(Instant::now());
        if removed > 0 {
            debug!(removed, "dedup cache sweep");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.index.lock().id_to_expiry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().id_to_expiry.is_empty()
    }
}
