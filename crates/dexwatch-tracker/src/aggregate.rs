//! Per-pair aggregate state and query views.

use chrono::{DateTime, Utc};
use dexwatch_core::{CurrencyAmount, CurrencyLeg, PairKey};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

/// Price history samples kept per aggregate; oldest dropped on overflow.
pub const PRICE_HISTORY_CAP: usize = 100;

/// One settlement-denominated price observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Rolling aggregate for one pair within one window.
///
/// Owned and mutated exclusively by the tracker; queries receive clones.
/// Bid/ask fields are only meaningful when one leg is XRP.
#[derive(Debug, Clone, Serialize)]
pub struct PairAggregate {
    pub pair_key: PairKey,
    pub taker_gets: CurrencyLeg,
    pub taker_pays: CurrencyLeg,
    pub volume: Decimal,
    pub count: u64,
    pub is_xrp_pair: bool,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
    pub bid_count: u64,
    pub ask_count: u64,
    pub last_price: Option<Decimal>,
    pub price_history: VecDeque<PricePoint>,
    pub last_update: DateTime<Utc>,
    /// Monotone insertion order, the tie-break for stable top-k sorting.
    #[serde(skip)]
    pub(crate) seq: u64,
}

/// Trade side relative to the settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// XRP is the pays-leg: the maker is offering the other asset for XRP.
    Bid,
    /// XRP is the gets-leg: the maker is offering XRP for the other asset.
    Ask,
    /// Not an XRP pair; no bid/ask classification.
    None,
}

impl PairAggregate {
    pub(crate) fn new(
        pair_key: PairKey,
        gets: &CurrencyAmount,
        pays: &CurrencyAmount,
        timestamp: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        Self {
            pair_key,
            taker_gets: gets.leg(),
            taker_pays: pays.leg(),
            volume: Decimal::ZERO,
            count: 0,
            is_xrp_pair: gets.is_xrp() || pays.is_xrp(),
            bid_volume: Decimal::ZERO,
            ask_volume: Decimal::ZERO,
            bid_count: 0,
            ask_count: 0,
            last_price: None,
            price_history: VecDeque::new(),
            last_update: timestamp,
            seq,
        }
    }

    /// Apply one activity record.
    pub(crate) fn apply(
        &mut self,
        side: Side,
        price: Option<Decimal>,
        volume: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        self.volume += volume;
        self.count += 1;
        self.last_update = timestamp;

        match side {
            Side::Bid => {
                self.bid_volume += volume;
                self.bid_count += 1;
            }
            Side::Ask => {
                self.ask_volume += volume;
                self.ask_count += 1;
            }
            Side::None => {}
        }

        if let Some(price) = price {
            self.last_price = Some(price);
            self.price_history.push_back(PricePoint { price, timestamp });
            while self.price_history.len() > PRICE_HISTORY_CAP {
                self.price_history.pop_front();
            }
        }
    }

    /// Percentage change between the oldest retained sample and the last
    /// price. Zero until at least two samples exist.
    pub fn price_change_pct(&self) -> Decimal {
        if self.price_history.len() < 2 {
            return Decimal::ZERO;
        }
        let (Some(first), Some(last)) = (self.price_history.front(), self.last_price) else {
            return Decimal::ZERO;
        };
        if first.price.is_zero() {
            return Decimal::ZERO;
        }
        ((last - first.price) / first.price * Decimal::from(100)).round_dp(2)
    }
}

/// Price trend tag derived from the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// XRP-pair view with derived trend and heat, returned by
/// `top_k_xrp_pairs`.
#[derive(Debug, Clone, Serialize)]
pub struct XrpPairSummary {
    #[serde(flatten)]
    pub aggregate: PairAggregate,
    pub price_change_pct: Decimal,
    pub trend: Trend,
    pub heat_level: u8,
}

/// Classify one record's side and compute the settlement-denominated price.
///
/// Bid: XRP is the pays-leg, price = pays / gets. Ask: XRP is the gets-leg,
/// price = gets / pays. Non-XRP pairs get no side and no price.
pub(crate) fn classify(gets: &CurrencyAmount, pays: &CurrencyAmount) -> (Side, Option<Decimal>) {
    let side = match (gets.is_xrp(), pays.is_xrp()) {
        (false, true) => Side::Bid,
        (true, false) => Side::Ask,
        _ => Side::None,
    };
    let price = match side {
        Side::Bid if !gets.value.is_zero() => Some(pays.value / gets.value),
        Side::Ask if !pays.value.is_zero() => Some(gets.value / pays.value),
        _ => None,
    };
    (side, price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn xrp(value: Decimal) -> CurrencyAmount {
        CurrencyAmount::xrp(value)
    }

    fn usd(value: Decimal) -> CurrencyAmount {
        CurrencyAmount::issued("USD", "rIssuer", value)
    }

    #[test]
    fn test_classify_bid_and_ask() {
        // Maker offers USD, demands XRP: bid on XRP terms
        let (side, price) = classify(&usd(dec!(50)), &xrp(dec!(100)));
        assert_eq!(side, Side::Bid);
        assert_eq!(price, Some(dec!(2)));

        // Maker offers XRP, demands USD: ask
        let (side, price) = classify(&xrp(dec!(100)), &usd(dec!(50)));
        assert_eq!(side, Side::Ask);
        assert_eq!(price, Some(dec!(2)));
    }

    #[test]
    fn test_classify_non_xrp_pair() {
        let eur = CurrencyAmount::issued("EUR", "rIssuer", dec!(10));
        let (side, price) = classify(&usd(dec!(50)), &eur);
        assert_eq!(side, Side::None);
        assert_eq!(price, None);
    }

    #[test]
    fn test_classify_zero_denominator() {
        let (side, price) = classify(&usd(dec!(0)), &xrp(dec!(100)));
        assert_eq!(side, Side::Bid);
        assert_eq!(price, None);
    }

    #[test]
    fn test_price_history_capped() {
        let gets = xrp(dec!(1));
        let pays = usd(dec!(1));
        let mut agg = PairAggregate::new(
            dexwatch_core::PairKey::of(&gets.leg(), &pays.leg()),
            &gets,
            &pays,
            ts(0),
            0,
        );
        for i in 0..(PRICE_HISTORY_CAP + 10) {
            agg.apply(Side::Ask, Some(Decimal::from(i as u64 + 1)), dec!(1), ts(i as i64));
        }
        assert_eq!(agg.price_history.len(), PRICE_HISTORY_CAP);
        // Oldest samples dropped: front is sample 11 of 110
        assert_eq!(agg.price_history.front().unwrap().price, dec!(11));
    }

    #[test]
    fn test_price_change_pct() {
        let gets = xrp(dec!(1));
        let pays = usd(dec!(1));
        let mut agg = PairAggregate::new(
            dexwatch_core::PairKey::of(&gets.leg(), &pays.leg()),
            &gets,
            &pays,
            ts(0),
            0,
        );
        assert_eq!(agg.price_change_pct(), Decimal::ZERO);

        agg.apply(Side::Ask, Some(dec!(2)), dec!(1), ts(0));
        agg.apply(Side::Ask, Some(dec!(3)), dec!(1), ts(1));
        assert_eq!(agg.price_change_pct(), dec!(50));
    }
}
