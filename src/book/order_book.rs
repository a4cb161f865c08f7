//! Locally-replicated limit order book for one symbol.
//!
//! Two ordered maps keyed by [`FixedPrice`]: bids read best-first via
//! `next_back()`, asks via `next()`. The exact decimal key is what makes
//! level removal deterministic — a price that arrived as `"42150.50"` and
//! later as `"42150.5"` hits the same entry.
//!
//! Best-level access is cached per side with a validity flag. Any mutation
//! of a side conservatively invalidates that side's cache; `snapshot()`
//! refreshes lazily, so repeated polls between updates stay O(1).

use chrono::Utc;
use std::collections::BTreeMap;

use crate::book::snapshot::BookSnapshot;
use crate::core::FixedPrice;
use crate::feed::messages::{DepthSnapshot, DepthUpdate, PriceLevel};

#[derive(Debug)]
pub struct OrderBook {
    bids: BTreeMap<FixedPrice, f64>,
    asks: BTreeMap<FixedPrice, f64>,
    last_update_id: u64,
    imbalance_levels: usize,
    best_bid: Option<(FixedPrice, f64)>,
    best_ask: Option<(FixedPrice, f64)>,
    best_bid_valid: bool,
    best_ask_valid: bool,
}

impl OrderBook {
    /// `imbalance_levels` is the depth `L` the imbalance sums over per side.
    pub fn new(imbalance_levels: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            imbalance_levels,
            best_bid: None,
            best_ask: None,
            best_bid_valid: false,
            best_ask_valid: false,
        }
    }

    /// Replace the whole book with a REST snapshot. Zero-quantity levels in
    /// the snapshot are skipped.
    pub fn apply_snapshot(&mut self, snapshot: &DepthSnapshot) {
        self.bids.clear();
        self.asks.clear();
        self.invalidate_best_caches();

        for PriceLevel { price, qty } in &snapshot.bids {
            if *qty > 0.0 {
                self.bids.insert(*price, *qty);
            }
        }
        for PriceLevel { price, qty } in &snapshot.asks {
            if *qty > 0.0 {
                self.asks.insert(*price, *qty);
            }
        }

        self.last_update_id = snapshot.last_update_id;
    }

    /// Apply an incremental diff: per level, positive quantity assigns,
    /// zero erases. Sequence checking is the caller's job
    /// ([`has_sequence_gap`](Self::has_sequence_gap)).
    pub fn apply_update(&mut self, update: &DepthUpdate) {
        if !update.bids.is_empty() {
            for PriceLevel { price, qty } in &update.bids {
                if *qty > 0.0 {
                    self.bids.insert(*price, *qty);
                } else {
                    self.bids.remove(price);
                }
            }
            self.best_bid_valid = false;
        }

        if !update.asks.is_empty() {
            for PriceLevel { price, qty } in &update.asks {
                if *qty > 0.0 {
                    self.asks.insert(*price, *qty);
                } else {
                    self.asks.remove(price);
                }
            }
            self.best_ask_valid = false;
        }

        self.last_update_id = update.final_update_id;
    }

    /// Gap check per the venue contract: the incoming diff's `pu` must equal
    /// our `last_update_id`. `first_update_id` is accepted for symmetry with
    /// the wire record.
    #[inline]
    pub fn has_sequence_gap(&self, _first_update_id: u64, prev_final_update_id: u64) -> bool {
        prev_final_update_id != self.last_update_id
    }

    /// Build the current analytics view. O(1) while the best caches are
    /// valid; a lazy refresh otherwise.
    pub fn snapshot(&mut self) -> BookSnapshot {
        self.refresh_best_caches();

        let mut snap = BookSnapshot::empty(self.last_update_id);
        snap.timestamp = Utc::now();
        snap.imbalance = self.imbalance();

        if let Some((price, qty)) = self.best_bid {
            snap.best_bid = price.to_f64();
            snap.best_bid_qty = qty;
        }
        if let Some((price, qty)) = self.best_ask {
            snap.best_ask = price.to_f64();
            snap.best_ask_qty = qty;
        }

        if self.best_bid.is_some() && self.best_ask.is_some() {
            snap.spread = snap.best_ask - snap.best_bid;
            snap.mid_price = (snap.best_bid + snap.best_ask) / 2.0;
            if snap.mid_price > 0.0 {
                snap.spread_bps = snap.spread / snap.mid_price * 10_000.0;
            }
        }

        snap
    }

    /// Depth imbalance over the top `L` levels per side:
    /// `(bid_vol - ask_vol) / total`, 0 when the book is empty or the total
    /// is non-positive. Always within [-1, 1].
    pub fn imbalance(&self) -> f64 {
        if self.bids.is_empty() && self.asks.is_empty() {
            return 0.0;
        }

        let bid_vol: f64 = self
            .bids
            .values()
            .rev()
            .take(self.imbalance_levels)
            .sum();
        let ask_vol: f64 = self.asks.values().take(self.imbalance_levels).sum();

        let total = bid_vol + ask_vol;
        if total <= 0.0 {
            return 0.0;
        }
        (bid_vol - ask_vol) / total
    }

    /// Drop everything and reset the sequence id.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_id = 0;
        self.invalidate_best_caches();
    }

    #[inline]
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    #[inline]
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Bids best-first, for tests and depth inspection.
    pub fn iter_bids(&self) -> impl Iterator<Item = (FixedPrice, f64)> + '_ {
        self.bids.iter().rev().map(|(p, q)| (*p, *q))
    }

    /// Asks best-first.
    pub fn iter_asks(&self) -> impl Iterator<Item = (FixedPrice, f64)> + '_ {
        self.asks.iter().map(|(p, q)| (*p, *q))
    }

    fn invalidate_best_caches(&mut self) {
        self.best_bid_valid = false;
        self.best_ask_valid = false;
    }

    fn refresh_best_caches(&mut self) {
        if !self.best_bid_valid {
            self.best_bid = self.bids.iter().next_back().map(|(p, q)| (*p, *q));
            self.best_bid_valid = true;
        }
        if !self.best_ask_valid {
            self.best_ask = self.asks.iter().next().map(|(p, q)| (*p, *q));
            self.best_ask_valid = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: &str, qty: f64) -> PriceLevel {
        PriceLevel::new(FixedPrice::parse(price).unwrap(), qty)
    }

    fn make_snapshot(last_id: u64, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> DepthSnapshot {
        DepthSnapshot {
            last_update_id: last_id,
            symbol: "BTCUSDT".into(),
            bids,
            asks,
        }
    }

    fn make_update(
        first: u64,
        fin: u64,
        prev: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> DepthUpdate {
        DepthUpdate {
            event_time: 0,
            symbol: "BTCUSDT".into(),
            first_update_id: first,
            final_update_id: fin,
            prev_final_update_id: prev,
            bids,
            asks,
        }
    }

    #[test]
    fn test_apply_snapshot_bbo() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1000,
            vec![level("42150", 1.5), level("42149", 2.0), level("42148", 0.5)],
            vec![level("42151", 1.0), level("42152", 1.5)],
        ));

        let snap = book.snapshot();
        assert_eq!(snap.best_bid, 42150.0);
        assert_eq!(snap.best_ask, 42151.0);
        assert_eq!(snap.best_bid_qty, 1.5);
        assert_eq!(snap.best_ask_qty, 1.0);
        assert_eq!(snap.spread, 1.0);
        assert_eq!(snap.mid_price, 42150.5);
        assert_eq!(book.last_update_id(), 1000);
        assert!(snap.is_valid());
    }

    #[test]
    fn test_snapshot_skips_zero_qty_levels() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1,
            vec![level("100", 0.0), level("99", 1.0)],
            vec![],
        ));
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.snapshot().best_bid, 99.0);
    }

    #[test]
    fn test_update_replaces_quantities() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1000,
            vec![level("42150", 1.5)],
            vec![level("42151", 1.0)],
        ));

        book.apply_update(&make_update(
            1001,
            1002,
            1000,
            vec![level("42150", 2.0)],
            vec![level("42151", 0.5)],
        ));

        let snap = book.snapshot();
        assert_eq!(snap.best_bid_qty, 2.0);
        assert_eq!(snap.best_ask_qty, 0.5);
        assert_eq!(book.last_update_id(), 1002);
    }

    #[test]
    fn test_zero_qty_removes_level() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1000,
            vec![level("42150", 1.5), level("42149", 2.0)],
            vec![level("42151", 1.0)],
        ));

        book.apply_update(&make_update(1001, 1002, 1000, vec![level("42150", 0.0)], vec![]));

        let snap = book.snapshot();
        assert_eq!(snap.best_bid, 42149.0);
        assert_eq!(snap.best_bid_qty, 2.0);
        assert_eq!(book.bid_levels(), 1);
    }

    #[test]
    fn test_equal_decimals_hit_same_level() {
        // "42150.50" inserted, "42150.5" removes it.
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(1, vec![level("42150.50", 1.0)], vec![]));
        book.apply_update(&make_update(2, 2, 1, vec![level("42150.5", 0.0)], vec![]));
        assert_eq!(book.bid_levels(), 0);
    }

    #[test]
    fn test_sides_stay_sorted() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1,
            vec![level("42148", 1.0), level("42150", 1.0), level("42149", 1.0)],
            vec![level("42153", 1.0), level("42151", 1.0), level("42152", 1.0)],
        ));

        let bid_prices: Vec<f64> = book.iter_bids().map(|(p, _)| p.to_f64()).collect();
        assert_eq!(bid_prices, vec![42150.0, 42149.0, 42148.0]);

        let ask_prices: Vec<f64> = book.iter_asks().map(|(p, _)| p.to_f64()).collect();
        assert_eq!(ask_prices, vec![42151.0, 42152.0, 42153.0]);
    }

    #[test]
    fn test_spread_bps() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1000,
            vec![level("42150", 1.5)],
            vec![level("42151", 1.0)],
        ));
        // spread 1.0, mid 42150.5 -> 1 / 42150.5 * 10_000
        let snap = book.snapshot();
        assert!((snap.spread_bps - 0.237245).abs() < 1e-4, "{}", snap.spread_bps);
    }

    #[test]
    fn test_imbalance_values() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1,
            vec![level("42150", 10.0), level("42149", 10.0), level("42148", 10.0)],
            vec![level("42151", 5.0), level("42152", 5.0), level("42153", 5.0)],
        ));
        assert!((book.imbalance() - 1.0 / 3.0).abs() < 1e-9);

        book.apply_snapshot(&make_snapshot(2, vec![level("42150", 5.0)], vec![level("42151", 15.0)]));
        assert!((book.imbalance() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_imbalance_respects_level_limit() {
        let mut book = OrderBook::new(2);
        book.apply_snapshot(&make_snapshot(
            1,
            vec![level("100", 1.0), level("99", 1.0), level("98", 100.0)],
            vec![level("101", 1.0), level("102", 1.0)],
        ));
        // Deep 98-level bid volume must not count with L = 2.
        assert_eq!(book.imbalance(), 0.0);
    }

    #[test]
    fn test_imbalance_empty_and_range() {
        let mut book = OrderBook::new(5);
        assert_eq!(book.imbalance(), 0.0);

        book.apply_snapshot(&make_snapshot(1, vec![level("100", 3.0)], vec![]));
        assert_eq!(book.imbalance(), 1.0);

        book.apply_snapshot(&make_snapshot(2, vec![], vec![level("101", 3.0)]));
        assert_eq!(book.imbalance(), -1.0);
    }

    #[test]
    fn test_sequence_gap_contract() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(1000, vec![], vec![]));

        assert!(!book.has_sequence_gap(1001, 1000));
        assert!(book.has_sequence_gap(1001, 999));
        assert!(book.has_sequence_gap(1002, 1001));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(
            1000,
            vec![level("42150", 1.5)],
            vec![level("42151", 1.0)],
        ));
        book.clear();

        assert_eq!(book.last_update_id(), 0);
        assert_eq!(book.bid_levels(), 0);
        assert_eq!(book.ask_levels(), 0);
        assert!(!book.snapshot().is_valid());
    }

    #[test]
    fn test_one_sided_book_snapshot() {
        let mut book = OrderBook::new(5);
        book.apply_snapshot(&make_snapshot(1, vec![level("42150", 1.0)], vec![]));
        let snap = book.snapshot();
        assert_eq!(snap.best_bid, 42150.0);
        assert_eq!(snap.best_ask, 0.0);
        assert_eq!(snap.spread, 0.0);
        assert!(!snap.is_valid());
    }
}
