//! Tracked-pair registry.
//!
//! Loads the set of currency pairs to monitor from the store and exposes a
//! comparable snapshot. The connection manager calls `refresh()` on a fixed
//! interval; only newcomers are returned, so it can subscribe incrementally.
//! Pairs removed from configuration are never unsubscribed mid-connection
//! (accepted staleness, see DESIGN.md); they drop out naturally on the next
//! reconnect.

pub mod error;

use dexwatch_core::{PairKey, TrackedPair};
use dexwatch_store::OfferDb;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub use error::{RegistryError, RegistryResult};

/// Registry of operator-configured pairs, reloaded periodically.
pub struct PairRegistry {
    db: Arc<OfferDb>,
    pairs: RwLock<Vec<TrackedPair>>,
    seen_keys: RwLock<HashSet<PairKey>>,
}

impl PairRegistry {
    pub fn new(db: Arc<OfferDb>) -> Self {
        Self {
            db,
            pairs: RwLock::new(Vec::new()),
            seen_keys: RwLock::new(HashSet::new()),
        }
    }

    /// Initial load. Replaces the snapshot and marks every pair as seen.
    pub fn load(&self) -> RegistryResult<Vec<TrackedPair>> {
        let pairs = self.db.load_tracked_pairs()?;
        info!(count = pairs.len(), "loaded tracked pairs");

        *self.seen_keys.write() = pairs.iter().map(TrackedPair::key).collect();
        *self.pairs.write() = pairs.clone();
        Ok(pairs)
    }

    /// Reload from the store and return only pairs not seen before.
    ///
    /// The full snapshot is replaced either way; newcomers are what the
    /// caller needs to subscribe to.
    pub fn refresh(&self) -> RegistryResult<Vec<TrackedPair>> {
        let pairs = self.db.load_tracked_pairs()?;

        let mut seen = self.seen_keys.write();
        let newcomers: Vec<TrackedPair> = pairs
            .iter()
            .filter(|p| !seen.contains(&p.key()))
            .cloned()
            .collect();
        for pair in &newcomers {
            seen.insert(pair.key());
        }
        drop(seen);

        *self.pairs.write() = pairs;

        if !newcomers.is_empty() {
            info!(count = newcomers.len(), "tracked-pair refresh found newcomers");
        } else {
            debug!("tracked-pair refresh: no changes");
        }
        Ok(newcomers)
    }

    /// Current snapshot of tracked pairs.
    pub fn snapshot(&self) -> Vec<TrackedPair> {
        self.pairs.read().clone()
    }

    /// Whether an observed pair (either orientation) is tracked.
    pub fn is_tracked(&self, gets: &dexwatch_core::CurrencyLeg, pays: &dexwatch_core::CurrencyLeg) -> bool {
        self.pairs.read().iter().any(|p| p.matches(gets, pays))
    }
}
