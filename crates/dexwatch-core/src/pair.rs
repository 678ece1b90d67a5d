//! Tracked currency pairs and the canonical pair key.

use crate::currency::normalize_currency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (currency, issuer) identity without an amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyLeg {
    pub currency: String,
    pub issuer: Option<String>,
}

impl CurrencyLeg {
    pub fn new(currency: impl Into<String>, issuer: Option<String>) -> Self {
        Self {
            currency: currency.into(),
            issuer,
        }
    }

    /// Canonical serialization used for pair keys: normalized upper-case
    /// currency plus issuer (or `-` for XRP).
    fn canonical(&self) -> String {
        format!(
            "{}@{}",
            normalize_currency(&self.currency).to_uppercase(),
            self.issuer.as_deref().unwrap_or("-")
        )
    }
}

impl fmt::Display for CurrencyLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issuer {
            Some(issuer) => write!(f, "{}.{}", self.currency, issuer),
            None => write!(f, "{}", self.currency),
        }
    }
}

/// Canonical, leg-order-independent identifier for a currency pair.
///
/// `A/B` and `B/A` map to the same key: both serializations are built and
/// the lexicographically smaller one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    /// Build the canonical key for two legs, in either order.
    pub fn of(a: &CurrencyLeg, b: &CurrencyLeg) -> Self {
        let forward = format!("{}/{}", a.canonical(), b.canonical());
        let reverse = format!("{}/{}", b.canonical(), a.canonical());
        Self(if forward <= reverse { forward } else { reverse })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operator-configured currency pair the system persists to storage.
///
/// Immutable for the duration of a refresh cycle; the registry reloads the
/// set periodically and diffs it by value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedPair {
    pub taker_gets: CurrencyLeg,
    pub taker_pays: CurrencyLeg,
}

impl TrackedPair {
    pub fn new(taker_gets: CurrencyLeg, taker_pays: CurrencyLeg) -> Self {
        Self {
            taker_gets,
            taker_pays,
        }
    }

    /// Canonical key for this pair (order-independent).
    pub fn key(&self) -> PairKey {
        PairKey::of(&self.taker_gets, &self.taker_pays)
    }

    /// Whether an observed (gets, pays) combination matches this pair in
    /// either orientation.
    pub fn matches(&self, gets: &CurrencyLeg, pays: &CurrencyLeg) -> bool {
        (&self.taker_gets == gets && &self.taker_pays == pays)
            || (&self.taker_gets == pays && &self.taker_pays == gets)
    }
}

impl fmt::Display for TrackedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.taker_gets, self.taker_pays)
    }
}
