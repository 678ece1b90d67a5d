//! Offer reconciliation pipeline.
//!
//! Consumes normalized lifecycle events and applies them:
//! - to the durable store (idempotent upsert keyed by offer id, delete on
//!   cancel) plus exactly one append-only history row per event, but only
//!   for events whose pair matches the tracked set in either orientation;
//! - to the in-memory pair tracker, for *every* event regardless of
//!   tracked filtering, so top-k analytics cover the whole book.
//!
//! Store failures are logged and counted; they degrade freshness but never
//! halt ingestion of subsequent events.

use chrono::{DateTime, Utc};
use dexwatch_feed::OfferLifecycleEvent;
use dexwatch_registry::PairRegistry;
use dexwatch_store::OfferDb;
use dexwatch_telemetry::{metrics, ProcessState};
use dexwatch_tracker::PairTracker;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Activity volume injected into the tracker per observed event.
///
/// The ranking deliberately counts order placements, not just fills, so an
/// active-but-unfilled pair still heats up. The two weights are separate
/// because they materially change top-k semantics; tune with care.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityWeights {
    /// Weight for placements, cancels and other non-fill activity.
    pub placement_weight: Decimal,
    /// Weight for true consumptions of a resting offer.
    pub fill_weight: Decimal,
}

impl Default for ActivityWeights {
    fn default() -> Self {
        Self {
            placement_weight: Decimal::ONE,
            fill_weight: Decimal::from(5),
        }
    }
}

/// The reconciler: one instance, driven synchronously by the single
/// event-consumer task so per-event side-effect order is deterministic.
pub struct Reconciler {
    db: Arc<OfferDb>,
    registry: Arc<PairRegistry>,
    tracker: Arc<PairTracker>,
    process_state: Arc<ProcessState>,
    weights: ActivityWeights,
}

impl Reconciler {
    pub fn new(
        db: Arc<OfferDb>,
        registry: Arc<PairRegistry>,
        tracker: Arc<PairTracker>,
        process_state: Arc<ProcessState>,
        weights: ActivityWeights,
    ) -> Self {
        Self {
            db,
            registry,
            tracker,
            process_state,
            weights,
        }
    }

    /// Apply every event extracted from one transaction message.
    pub fn apply_all(&self, events: &[OfferLifecycleEvent]) {
        let now = Utc::now();
        for event in events {
            self.apply(event, now);
        }
    }

    /// Apply one event at an explicit instant.
    pub fn apply(&self, event: &OfferLifecycleEvent, now: DateTime<Utc>) {
        if self
            .registry
            .is_tracked(&event.taker_gets.leg(), &event.taker_pays.leg())
        {
            self.persist(event, now);
        } else {
            debug!(offer_id = %event.offer_id, "untracked pair, store skipped");
        }

        // Activity accounting is unconditional: top-k is not limited to
        // explicitly tracked pairs.
        if event.is_fill() {
            self.tracker.record_fill(
                &event.taker_gets,
                &event.taker_pays,
                self.weights.fill_weight,
                now,
            );
        } else {
            self.tracker.record_trade(
                &event.taker_gets,
                &event.taker_pays,
                self.weights.placement_weight,
                now,
            );
        }

        self.process_state.record_event(now);
    }

    /// History row plus live-row upsert/delete, in that order.
    fn persist(&self, event: &OfferLifecycleEvent, now: DateTime<Utc>) {
        if let Err(e) = self.db.append_event(&event.to_history_event(now)) {
            metrics::STORE_ERRORS_TOTAL
                .with_label_values(&["history_append"])
                .inc();
            warn!(offer_id = %event.offer_id, error = %e, "history append failed");
        }

        if event.kind.is_upsert() {
            if let Err(e) = self.db.upsert_offer(&event.to_offer(now)) {
                metrics::STORE_ERRORS_TOTAL
                    .with_label_values(&["offer_upsert"])
                    .inc();
                warn!(offer_id = %event.offer_id, error = %e, "offer upsert failed");
                return;
            }
        } else {
            match self.db.delete_offer(&event.offer_id) {
                // Absence is fine: backfill may never have seen the row
                Ok(existed) => {
                    if !existed {
                        debug!(offer_id = %event.offer_id, "cancel for unknown offer");
                    }
                }
                Err(e) => {
                    metrics::STORE_ERRORS_TOTAL
                        .with_label_values(&["offer_delete"])
                        .inc();
                    warn!(offer_id = %event.offer_id, error = %e, "offer delete failed");
                    return;
                }
            }
        }

        metrics::OFFER_EVENTS_TOTAL
            .with_label_values(&[event.kind.as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dexwatch_core::{CurrencyAmount, CurrencyLeg, OfferEventKind, TrackedPair};
    use dexwatch_feed::EventSource;
    use dexwatch_store::OfferFilter;
    use dexwatch_tracker::Window;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn usd_pair() -> TrackedPair {
        TrackedPair::new(
            CurrencyLeg::new("XRP", None),
            CurrencyLeg::new("USD", Some("rIssuer".to_string())),
        )
    }

    fn event(
        id: &str,
        kind: OfferEventKind,
        source: EventSource,
        gets_xrp: Decimal,
    ) -> OfferLifecycleEvent {
        OfferLifecycleEvent {
            offer_id: id.to_string(),
            account: Some("rMaker".to_string()),
            taker_gets: CurrencyAmount::xrp(gets_xrp),
            taker_pays: CurrencyAmount::issued("USD", "rIssuer", dec!(10)),
            flags: None,
            expiration: None,
            kind,
            source,
        }
    }

    struct Fixture {
        db: Arc<OfferDb>,
        tracker: Arc<PairTracker>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(OfferDb::open_in_memory().unwrap());
        db.add_tracked_pair(&usd_pair()).unwrap();
        let registry = Arc::new(PairRegistry::new(db.clone()));
        registry.load().unwrap();
        let tracker = Arc::new(PairTracker::new());
        let reconciler = Reconciler::new(
            db.clone(),
            registry,
            tracker.clone(),
            Arc::new(ProcessState::new()),
            ActivityWeights::default(),
        );
        Fixture {
            db,
            tracker,
            reconciler,
        }
    }

    #[test]
    fn test_create_then_modify_converges() {
        let f = fixture();
        f.reconciler.apply(
            &event("A", OfferEventKind::Created, EventSource::Transaction, dec!(100)),
            ts(0),
        );
        f.reconciler.apply(
            &event("A", OfferEventKind::Modified, EventSource::LedgerEntry, dec!(40)),
            ts(1),
        );

        let offers = f.db.list_offers(&OfferFilter::default()).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].taker_gets.value, dec!(40));

        let kinds: Vec<_> = f
            .db
            .history_for_offer("A")
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![OfferEventKind::Created, OfferEventKind::Modified]);
    }

    #[test]
    fn test_cancel_removes_live_row_preserves_history() {
        let f = fixture();
        f.reconciler.apply(
            &event("A", OfferEventKind::Created, EventSource::Transaction, dec!(100)),
            ts(0),
        );
        f.reconciler.apply(
            &event("A", OfferEventKind::Cancelled, EventSource::LedgerEntry, dec!(100)),
            ts(1),
        );

        assert_eq!(f.db.offer_count().unwrap(), 0);
        let kinds: Vec<_> = f
            .db
            .history_for_offer("A")
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![OfferEventKind::Created, OfferEventKind::Cancelled]
        );
    }

    #[test]
    fn test_cancel_for_never_seen_offer_is_quiet() {
        let f = fixture();
        f.reconciler.apply(
            &event("GHOST", OfferEventKind::Cancelled, EventSource::LedgerEntry, dec!(1)),
            ts(0),
        );

        assert_eq!(f.db.offer_count().unwrap(), 0);
        // The cancellation is still part of history
        assert_eq!(f.db.history_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_kind_upserts() {
        let f = fixture();
        f.reconciler.apply(
            &event("A", OfferEventKind::Unknown, EventSource::LedgerEntry, dec!(7)),
            ts(0),
        );
        assert_eq!(f.db.offer_count().unwrap(), 1);
    }

    #[test]
    fn test_untracked_pair_skips_store_but_reaches_tracker() {
        let f = fixture();
        let mut untracked = event(
            "X",
            OfferEventKind::Created,
            EventSource::Transaction,
            dec!(5),
        );
        untracked.taker_pays = CurrencyAmount::issued("EUR", "rOther", dec!(3));
        f.reconciler.apply(&untracked, ts(0));

        assert_eq!(f.db.offer_count().unwrap(), 0);
        assert_eq!(f.db.history_count().unwrap(), 0);

        let top = f.tracker.top_k_at(Window::TenMinutes, 10, ts(0));
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_fill_uses_fill_weight() {
        let f = fixture();
        // Placement: weight 1
        f.reconciler.apply(
            &event("A", OfferEventKind::Created, EventSource::Transaction, dec!(100)),
            ts(0),
        );
        // Ledger-entry modification is a fill: weight 5
        f.reconciler.apply(
            &event("A", OfferEventKind::Modified, EventSource::LedgerEntry, dec!(60)),
            ts(1),
        );

        let top = f.tracker.top_k_at(Window::TenMinutes, 1, ts(1));
        assert_eq!(top[0].volume, dec!(6));
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_backfill_then_live_event_converges() {
        let f = fixture();
        // Simulate a backfill upsert for the same offer id
        let snapshot = event(
            "A",
            OfferEventKind::Created,
            EventSource::Snapshot,
            dec!(100),
        );
        f.db.upsert_offer(&snapshot.to_offer(ts(0))).unwrap();

        // Live reconciliation of the same resting order
        f.reconciler.apply(
            &event("A", OfferEventKind::Created, EventSource::Transaction, dec!(100)),
            ts(5),
        );

        let offers = f.db.list_offers(&OfferFilter::default()).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].updated_at, ts(5));
    }
}
