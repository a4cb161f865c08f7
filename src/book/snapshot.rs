//! Immutable point-in-time view of the book.

use chrono::{DateTime, Utc};

/// Best-of-book and derived analytics, produced on demand by
/// [`OrderBook::snapshot`](crate::book::OrderBook::snapshot).
///
/// Prices and quantities are f64 here: this is the analytics/display side.
/// The exact fixed-point keys stay inside the book.
#[derive(Debug, Clone, Copy)]
pub struct BookSnapshot {
    pub best_bid: f64,
    pub best_ask: f64,
    pub best_bid_qty: f64,
    pub best_ask_qty: f64,
    pub spread: f64,
    /// Spread relative to mid, in basis points (`spread / mid * 10_000`).
    pub spread_bps: f64,
    pub mid_price: f64,
    /// Depth imbalance over the configured top levels, in [-1, 1].
    pub imbalance: f64,
    pub last_update_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(last_update_id: u64) -> Self {
        Self {
            best_bid: 0.0,
            best_ask: 0.0,
            best_bid_qty: 0.0,
            best_ask_qty: 0.0,
            spread: 0.0,
            spread_bps: 0.0,
            mid_price: 0.0,
            imbalance: 0.0,
            last_update_id,
            timestamp: Utc::now(),
        }
    }

    /// Both sides populated and uncrossed.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.best_bid > 0.0 && self.best_ask > 0.0 && self.best_ask > self.best_bid
    }
}
