//! The pair tracker: windowed maps, queries and eviction.

use crate::aggregate::{classify, PairAggregate, Trend, XrpPairSummary};
use crate::window::Window;
use chrono::{DateTime, Utc};
use dexwatch_core::{CurrencyAmount, CurrencyLeg, PairKey};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Default number of pairs returned when the caller does not ask for k.
pub const DEFAULT_TOP_K: usize = 20;

/// Activity-score thresholds for the 1-5 heat scale.
///
/// `score = volume / HEAT_VOLUME_DIVISOR + count / HEAT_COUNT_DIVISOR`;
/// each threshold crossed raises the level by one.
pub const HEAT_VOLUME_DIVISOR: u64 = 1_000_000;
pub const HEAT_COUNT_DIVISOR: u64 = 10;
pub const HEAT_SCORE_LEVEL_2: u64 = 5;
pub const HEAT_SCORE_LEVEL_3: u64 = 20;
pub const HEAT_SCORE_LEVEL_4: u64 = 50;
pub const HEAT_SCORE_LEVEL_5: u64 = 100;

/// Price-change percentage beyond which the trend leaves neutral (±).
pub fn trend_threshold_pct() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

/// Per-window stats for a single pair.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub window: Window,
    pub volume: Decimal,
    pub count: u64,
    pub last_update: DateTime<Utc>,
    /// 1-based position in the window's volume ranking.
    pub rank: Option<usize>,
}

/// All-window stats for a single pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairStats {
    pub pair_key: PairKey,
    pub windows: Vec<WindowStats>,
}

/// Operational introspection of one window's map.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMemoryStats {
    pub window: Window,
    pub entries: usize,
    pub approx_bytes: usize,
}

struct WindowSlot {
    window: Window,
    map: RwLock<HashMap<PairKey, PairAggregate>>,
}

/// Concurrent, self-evicting aggregator over all three windows.
///
/// Writes are serialized per window by an `RwLock`; readers get cloned
/// snapshots and never observe a partially-updated aggregate.
pub struct PairTracker {
    slots: [WindowSlot; 3],
    seq: AtomicU64,
}

impl Default for PairTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PairTracker {
    pub fn new() -> Self {
        Self {
            slots: Window::ALL.map(|window| WindowSlot {
                window,
                map: RwLock::new(HashMap::new()),
            }),
            seq: AtomicU64::new(0),
        }
    }

    /// Record order-placement activity for a pair.
    pub fn record_trade(
        &self,
        gets: &CurrencyAmount,
        pays: &CurrencyAmount,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        self.record(gets, pays, volume, timestamp);
    }

    /// Record a detected fill (true consumption of a resting offer).
    ///
    /// Same aggregate update as `record_trade`; the distinction is carried
    /// by the volume weight the caller chose.
    pub fn record_fill(
        &self,
        gets: &CurrencyAmount,
        pays: &CurrencyAmount,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        debug!(gets = %gets, pays = %pays, "recording fill activity");
        self.record(gets, pays, volume, timestamp);
    }

    fn record(
        &self,
        gets: &CurrencyAmount,
        pays: &CurrencyAmount,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        if gets.currency.is_empty() || pays.currency.is_empty() {
            // Never let a malformed record panic or poison the hot path.
            warn!("dropping activity record with missing currency");
            return;
        }

        let key = PairKey::of(&gets.leg(), &pays.leg());
        let (side, price) = classify(gets, pays);

        for slot in &self.slots {
            let cutoff = timestamp - slot.window.horizon();
            let mut map = slot.map.write();

            // Lazy eviction on write: a stale aggregate restarts from zero
            // rather than leaking the previous horizon's totals in.
            if map
                .get(&key)
                .is_some_and(|existing| existing.last_update < cutoff)
            {
                map.remove(&key);
            }

            let entry = map.entry(key.clone()).or_insert_with(|| {
                PairAggregate::new(
                    key.clone(),
                    gets,
                    pays,
                    timestamp,
                    self.seq.fetch_add(1, Ordering::Relaxed),
                )
            });
            entry.apply(side, price, volume, timestamp);
        }
    }

    /// Top `k` pairs by volume within the window's horizon.
    pub fn top_k(&self, window: Window, k: usize) -> Vec<PairAggregate> {
        self.top_k_at(window, k, Utc::now())
    }

    /// `top_k` evaluated at an explicit instant (deterministic in tests).
    pub fn top_k_at(&self, window: Window, k: usize, now: DateTime<Utc>) -> Vec<PairAggregate> {
        let mut pairs = self.fresh_aggregates(window, now);
        sort_by_volume(&mut pairs);
        pairs.truncate(k);
        pairs
    }

    /// Top `k` XRP pairs with derived price change, trend and heat.
    pub fn top_k_xrp_pairs(&self, window: Window, k: usize) -> Vec<XrpPairSummary> {
        self.top_k_xrp_pairs_at(window, k, Utc::now())
    }

    pub fn top_k_xrp_pairs_at(
        &self,
        window: Window,
        k: usize,
        now: DateTime<Utc>,
    ) -> Vec<XrpPairSummary> {
        let mut pairs = self.fresh_aggregates(window, now);
        pairs.retain(|a| a.is_xrp_pair);
        sort_by_volume(&mut pairs);
        pairs.truncate(k);

        pairs
            .into_iter()
            .map(|aggregate| {
                let price_change_pct = aggregate.price_change_pct();
                let trend = trend_of(price_change_pct);
                let heat_level = heat_level(aggregate.volume, aggregate.count);
                XrpPairSummary {
                    aggregate,
                    price_change_pct,
                    trend,
                    heat_level,
                }
            })
            .collect()
    }

    /// Per-window summary for one pair, with its volume rank.
    ///
    /// Rank is re-derived from the full ranking; O(n log n) per window is
    /// accepted for the pair cardinalities this tracks.
    pub fn pair_stats(&self, gets: &CurrencyLeg, pays: &CurrencyLeg) -> PairStats {
        self.pair_stats_at(gets, pays, Utc::now())
    }

    pub fn pair_stats_at(
        &self,
        gets: &CurrencyLeg,
        pays: &CurrencyLeg,
        now: DateTime<Utc>,
    ) -> PairStats {
        let key = PairKey::of(gets, pays);
        let mut windows = Vec::new();

        for slot in &self.slots {
            let cutoff = now - slot.window.horizon();
            let entry = {
                let map = slot.map.read();
                map.get(&key)
                    .filter(|a| a.last_update >= cutoff)
                    .map(|a| (a.volume, a.count, a.last_update))
            };
            let Some((volume, count, last_update)) = entry else {
                continue;
            };

            let ranking = self.top_k_at(slot.window, usize::MAX, now);
            let rank = ranking
                .iter()
                .position(|a| a.pair_key == key)
                .map(|idx| idx + 1);

            windows.push(WindowStats {
                window: slot.window,
                volume,
                count,
                last_update,
                rank,
            });
        }

        PairStats {
            pair_key: key,
            windows,
        }
    }

    /// Entry counts and rough byte estimates per window.
    pub fn memory_stats(&self) -> Vec<WindowMemoryStats> {
        self.slots
            .iter()
            .map(|slot| {
                let map = slot.map.read();
                let approx_bytes = map
                    .iter()
                    .map(|(key, agg)| {
                        key.as_str().len()
                            + std::mem::size_of::<PairAggregate>()
                            + agg.price_history.len()
                                * std::mem::size_of::<crate::aggregate::PricePoint>()
                    })
                    .sum();
                WindowMemoryStats {
                    window: slot.window,
                    entries: map.len(),
                    approx_bytes,
                }
            })
            .collect()
    }

    /// Evict every aggregate whose last update fell outside the horizon.
    ///
    /// Returns the number of entries removed. Reads filter by horizon
    /// anyway; the sweep exists to bound memory for pairs that go quiet.
    pub fn sweep(&self, window: Window) -> usize {
        self.sweep_at(window, Utc::now())
    }

    pub fn sweep_at(&self, window: Window, now: DateTime<Utc>) -> usize {
        let slot = &self.slots[Window::ALL.iter().position(|w| *w == window).unwrap_or(0)];
        let cutoff = now - window.horizon();

        let mut map = slot.map.write();
        let before = map.len();
        map.retain(|_, agg| agg.last_update >= cutoff);
        let removed = before - map.len();
        drop(map);

        if removed > 0 {
            info!(window = %window, removed, "evicted stale pair aggregates");
        }
        removed
    }

    fn fresh_aggregates(&self, window: Window, now: DateTime<Utc>) -> Vec<PairAggregate> {
        let slot = &self.slots[Window::ALL.iter().position(|w| *w == window).unwrap_or(0)];
        let cutoff = now - window.horizon();
        let map = slot.map.read();
        map.values()
            .filter(|a| a.last_update >= cutoff)
            .cloned()
            .collect()
    }
}

/// Volume-descending order, ties broken by insertion sequence so repeated
/// queries over equal volumes are deterministic.
fn sort_by_volume(pairs: &mut [PairAggregate]) {
    pairs.sort_by(|a, b| b.volume.cmp(&a.volume).then(a.seq.cmp(&b.seq)));
}

fn trend_of(price_change_pct: Decimal) -> Trend {
    if price_change_pct > trend_threshold_pct() {
        Trend::Up
    } else if price_change_pct < -trend_threshold_pct() {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

fn heat_level(volume: Decimal, count: u64) -> u8 {
    let score = volume / Decimal::from(HEAT_VOLUME_DIVISOR)
        + Decimal::from(count) / Decimal::from(HEAT_COUNT_DIVISOR);

    if score > Decimal::from(HEAT_SCORE_LEVEL_5) {
        5
    } else if score > Decimal::from(HEAT_SCORE_LEVEL_4) {
        4
    } else if score > Decimal::from(HEAT_SCORE_LEVEL_3) {
        3
    } else if score > Decimal::from(HEAT_SCORE_LEVEL_2) {
        2
    } else {
        1
    }
}
