//! Subscribed-book tracking.

use dexwatch_core::{PairKey, TrackedPair};
use parking_lot::RwLock;
use std::collections::HashSet;

/// The set of order books subscribed on the current connection.
///
/// Reset on every reconnect: subscriptions do not survive the socket.
#[derive(Debug, Default)]
pub struct SubscribedBooks {
    keys: RwLock<HashSet<PairKey>>,
}

impl SubscribedBooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pair: &TrackedPair) -> bool {
        self.keys.read().contains(&pair.key())
    }

    /// Mark a pair subscribed. Returns false if it already was.
    pub fn insert(&self, pair: &TrackedPair) -> bool {
        self.keys.write().insert(pair.key())
    }

    pub fn reset(&self) {
        self.keys.write().clear();
    }

    pub fn count(&self) -> usize {
        self.keys.read().len()
    }
}
