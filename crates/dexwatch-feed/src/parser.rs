//! Transaction message parsing.
//!
//! A single transaction notification can carry offer activity in two
//! independent shapes:
//! 1. the top-level transaction itself (`OfferCreate` / `OfferCancel`),
//!    keyed by the transaction hash;
//! 2. ledger-entry mutations inside `meta.AffectedNodes`, keyed by the
//!    entry's `LedgerIndex`. These are the authoritative source for fills and
//!    cancels, which may appear several per transaction or with no
//!    top-level counterpart at all.
//!
//! Both shapes normalize into the same `OfferLifecycleEvent`. A malformed
//! node is skipped with a warning; its siblings still parse.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use dexwatch_core::{
    drops_to_xrp, ledger_epoch_to_utc, normalize_currency, CurrencyAmount, Offer, OfferEvent,
    OfferEventKind,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Where an event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// The top-level transaction (an order placement or cancel request).
    Transaction,
    /// A ledger-entry mutation in the transaction's side effects. These
    /// reflect what actually happened on the book (fills, consumptions).
    LedgerEntry,
    /// A resting order from a paginated book snapshot (backfill).
    Snapshot,
}

/// A normalized offer lifecycle event, ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferLifecycleEvent {
    pub offer_id: String,
    pub account: Option<String>,
    pub taker_gets: CurrencyAmount,
    pub taker_pays: CurrencyAmount,
    pub flags: Option<u32>,
    pub expiration: Option<DateTime<Utc>>,
    pub kind: OfferEventKind,
    pub source: EventSource,
}

impl OfferLifecycleEvent {
    /// The live-store row this event implies.
    pub fn to_offer(&self, at: DateTime<Utc>) -> Offer {
        Offer {
            offer_id: self.offer_id.clone(),
            account: self.account.clone(),
            taker_gets: self.taker_gets.clone(),
            taker_pays: self.taker_pays.clone(),
            flags: self.flags,
            expiration: self.expiration,
            updated_at: at,
        }
    }

    /// The history row this event implies.
    pub fn to_history_event(&self, at: DateTime<Utc>) -> OfferEvent {
        OfferEvent {
            offer_id: self.offer_id.clone(),
            account: self.account.clone(),
            taker_gets: self.taker_gets.clone(),
            taker_pays: self.taker_pays.clone(),
            kind: self.kind,
            event_time: at,
        }
    }

    /// A ledger-entry modification or deletion reflects real consumption
    /// of a resting offer, as opposed to placement noise.
    pub fn is_fill(&self) -> bool {
        self.source == EventSource::LedgerEntry
            && matches!(self.kind, OfferEventKind::Modified | OfferEventKind::Cancelled)
    }
}

/// Parse counters, exposed for introspection.
#[derive(Debug, Default)]
pub struct ParserStats {
    pub events_extracted: AtomicU64,
    pub nodes_skipped: AtomicU64,
}

impl ParserStats {
    pub fn extracted(&self) -> u64 {
        self.events_extracted.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.nodes_skipped.load(Ordering::Relaxed)
    }
}

/// Wire form of a ledger amount: either an XRP drops string or an issued
/// currency object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Drops(String),
    Issued {
        currency: String,
        #[serde(default)]
        issuer: Option<String>,
        value: String,
    },
}

impl RawAmount {
    fn normalize(self) -> FeedResult<CurrencyAmount> {
        match self {
            Self::Drops(raw) => Ok(CurrencyAmount::xrp(drops_to_xrp(&raw)?)),
            Self::Issued {
                currency,
                issuer,
                value,
            } => {
                let value = Decimal::from_str(&value)
                    .map_err(|_| FeedError::BadAmount(value.clone()))?;
                Ok(CurrencyAmount {
                    currency: normalize_currency(&currency),
                    issuer,
                    value,
                })
            }
        }
    }
}

/// Offer fields common to ledger entries and top-level transactions.
#[derive(Debug, Deserialize)]
struct RawOfferFields {
    #[serde(rename = "Account")]
    account: Option<String>,
    #[serde(rename = "TakerGets")]
    taker_gets: Option<RawAmount>,
    #[serde(rename = "TakerPays")]
    taker_pays: Option<RawAmount>,
    #[serde(rename = "Flags")]
    flags: Option<u32>,
    #[serde(rename = "Expiration")]
    expiration: Option<i64>,
}

impl RawOfferFields {
    fn into_event(
        self,
        offer_id: String,
        kind: OfferEventKind,
        source: EventSource,
    ) -> FeedResult<OfferLifecycleEvent> {
        let taker_gets = self
            .taker_gets
            .ok_or(FeedError::MissingField("TakerGets"))?
            .normalize()?;
        let taker_pays = self
            .taker_pays
            .ok_or(FeedError::MissingField("TakerPays"))?
            .normalize()?;
        Ok(OfferLifecycleEvent {
            offer_id,
            account: self.account,
            taker_gets,
            taker_pays,
            flags: self.flags,
            expiration: ledger_epoch_to_utc(self.expiration),
            kind,
            source,
        })
    }
}

/// Parser for transaction stream messages.
#[derive(Debug, Default)]
pub struct EventParser {
    stats: ParserStats,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    /// Extract every offer lifecycle event from one transaction message.
    ///
    /// Ledger-entry mutations come first (they are the authoritative
    /// record), then the top-level transaction if it is offer-related.
    pub fn parse_transaction(&self, msg: &Value) -> Vec<OfferLifecycleEvent> {
        let Some(txn) = msg.get("transaction").or_else(|| msg.get("tx_json")) else {
            return Vec::new();
        };
        let Some(meta) = msg.get("meta") else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if let Some(nodes) = meta.get("AffectedNodes").and_then(Value::as_array) {
            for node in nodes {
                match self.parse_affected_node(node) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => {
                        self.stats.nodes_skipped.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "skipping malformed ledger-entry node");
                    }
                }
            }
        }

        match self.parse_top_level(txn) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                self.stats.nodes_skipped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "top-level transaction carried no usable offer");
            }
        }

        self.stats
            .events_extracted
            .fetch_add(events.len() as u64, Ordering::Relaxed);
        events
    }

    /// One `AffectedNodes` entry. Non-offer entries yield `Ok(None)`.
    fn parse_affected_node(&self, node: &Value) -> FeedResult<Option<OfferLifecycleEvent>> {
        let wrappers = [
            ("CreatedNode", "NewFields", OfferEventKind::Created),
            ("ModifiedNode", "FinalFields", OfferEventKind::Modified),
            ("DeletedNode", "FinalFields", OfferEventKind::Cancelled),
        ];

        for (wrapper, fields_key, kind) in wrappers {
            let Some(inner) = node.get(wrapper) else {
                continue;
            };
            if inner.get("LedgerEntryType").and_then(Value::as_str) != Some("Offer") {
                return Ok(None);
            }
            let offer_id = inner
                .get("LedgerIndex")
                .and_then(Value::as_str)
                .ok_or(FeedError::MissingField("LedgerIndex"))?
                .to_string();
            let fields = inner
                .get(fields_key)
                .cloned()
                .ok_or(FeedError::MissingField("offer fields"))?;
            let raw: RawOfferFields = serde_json::from_value(fields)
                .map_err(|e| FeedError::BadAmount(e.to_string()))?;
            return raw
                .into_event(offer_id, kind, EventSource::LedgerEntry)
                .map(Some);
        }

        // Occasionally the entry arrives unwrapped as a bare Offer object.
        if node.get("LedgerEntryType").and_then(Value::as_str) == Some("Offer") {
            let offer_id = node
                .get("LedgerIndex")
                .and_then(Value::as_str)
                .ok_or(FeedError::MissingField("LedgerIndex"))?
                .to_string();
            let raw: RawOfferFields = serde_json::from_value(node.clone())
                .map_err(|e| FeedError::BadAmount(e.to_string()))?;
            return raw
                .into_event(offer_id, OfferEventKind::Unknown, EventSource::LedgerEntry)
                .map(Some);
        }

        Ok(None)
    }

    /// One resting order from a `book_offers` snapshot page.
    ///
    /// Snapshot rows carry the same fields as a created ledger entry, with
    /// the offer id under `index`. Backfill upserts them exactly as a
    /// created event would be, minus the history row.
    pub fn parse_resting_offer(&self, value: &Value) -> FeedResult<OfferLifecycleEvent> {
        let offer_id = value
            .get("index")
            .and_then(Value::as_str)
            .ok_or(FeedError::MissingField("index"))?
            .to_string();
        let raw: RawOfferFields = serde_json::from_value(value.clone())
            .map_err(|e| FeedError::BadAmount(e.to_string()))?;
        raw.into_event(offer_id, OfferEventKind::Created, EventSource::Snapshot)
    }

    /// The top-level transaction, when it is an offer placement or cancel.
    ///
    /// An `OfferCancel` carries no amounts of its own; its effect arrives
    /// through the deleted ledger entry, so an amount-less top level is
    /// simply not an event.
    fn parse_top_level(&self, txn: &Value) -> FeedResult<Option<OfferLifecycleEvent>> {
        let kind = match txn.get("TransactionType").and_then(Value::as_str) {
            Some("OfferCreate") => OfferEventKind::Created,
            Some("OfferCancel") => OfferEventKind::Cancelled,
            _ => return Ok(None),
        };

        let offer_id = txn
            .get("hash")
            .and_then(Value::as_str)
            .ok_or(FeedError::MissingField("hash"))?
            .to_string();

        if txn.get("TakerGets").is_none() || txn.get("TakerPays").is_none() {
            return Ok(None);
        }

        let raw: RawOfferFields =
            serde_json::from_value(txn.clone()).map_err(|e| FeedError::BadAmount(e.to_string()))?;
        raw.into_event(offer_id, kind, EventSource::Transaction)
            .map(Some)
    }
}
