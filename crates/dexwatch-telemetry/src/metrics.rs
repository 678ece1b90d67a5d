//! Prometheus metrics for the dexwatch monitor.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure (duplicate metric name) is a fatal configuration error that
//! should crash at startup, never at runtime: these statics initialize
//! once and only once.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter, CounterVec,
    Gauge, GaugeVec, IntCounter,
};

/// Ledger stream connection state (1 = connected).
pub static STREAM_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "dexwatch_stream_connected",
        "Ledger stream connection state (1=connected)"
    )
    .unwrap()
});

/// Total stream reconnection attempts.
pub static STREAM_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dexwatch_stream_reconnect_total",
        "Total ledger stream reconnection attempts"
    )
    .unwrap()
});

/// Offer lifecycle events applied, by event type.
pub static OFFER_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dexwatch_offer_events_total",
        "Offer lifecycle events applied to the store",
        &["event_type"]
    )
    .unwrap()
});

/// Store write failures, by operation.
pub static STORE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dexwatch_store_errors_total",
        "Store write failures (ingestion continues past these)",
        &["operation"]
    )
    .unwrap()
});

/// Resting offers upserted during backfill.
pub static BACKFILL_OFFERS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dexwatch_backfill_offers_total",
        "Resting offers upserted by the historical backfill"
    )
    .unwrap()
});

/// Live aggregate entries per tracker window.
pub static TRACKER_ENTRIES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "dexwatch_tracker_entries",
        "Pair aggregates currently held per window",
        &["window"]
    )
    .unwrap()
});
