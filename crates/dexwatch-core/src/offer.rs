//! Offers and their lifecycle events.

use crate::amount::CurrencyAmount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle transition of an offer as observed from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferEventKind {
    Created,
    Modified,
    Cancelled,
    /// An offer ledger entry seen without a recognizable wrapper; stored
    /// with upsert semantics like `Modified`.
    Unknown,
}

impl OfferEventKind {
    /// Stable string form used in the history table and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the stable string form back (for store reads).
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "modified" => Self::Modified,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Whether this transition upserts the live row (vs. deleting it).
    pub fn is_upsert(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for OfferEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resting offer on the ledger's order book, as currently known.
///
/// Keyed by the ledger-assigned `offer_id`; at most one live row exists per
/// id. An offer absent from the store is not currently resting on the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub account: Option<String>,
    pub taker_gets: CurrencyAmount,
    pub taker_pays: CurrencyAmount,
    pub flags: Option<u32>,
    pub expiration: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable history row: an observed lifecycle transition.
///
/// Never updated or deleted; the audit trail for the live offer table.
/// History outlives the live row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEvent {
    pub offer_id: String,
    pub account: Option<String>,
    pub taker_gets: CurrencyAmount,
    pub taker_pays: CurrencyAmount,
    pub kind: OfferEventKind,
    pub event_time: DateTime<Utc>,
}
