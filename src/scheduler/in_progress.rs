//! Addresses with a scan currently in flight.

use std::sync::Arc;

use dashmap::DashSet;

#[derive(Debug, Clone, Default)]
pub struct InProgressSet {
    addresses: Arc<DashSet<String>>,
}

impl InProgressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `address`. Returns `None` when another task already holds it.
    /// The claim is released when the returned guard is dropped.
    pub fn try_acquire(
        &self,
        address: &str,
    ) -> Option<InProgressGuard> {
        if !self.addresses.insert(address.to_string()) {
            return None;
        }
        Some(InProgressGuard {
            addresses: self.addresses.clone(),
            address: address.to_string(),
        })
    }

    pub fn contains(
        &self,
        address: &str,
    ) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[derive(Debug)]
pub struct InProgressGuard {
    addresses: Arc<DashSet<String>>,
    address: String,
}

impl InProgressGuard {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.addresses.remove(&self.address);
    }
}
