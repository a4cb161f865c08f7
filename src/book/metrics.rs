//! Derived reference prices over a book snapshot.

use crate::book::snapshot::BookSnapshot;

/// Quantity-weighted mid price. Falls back to plain mid when the top-of-book
/// quantities are zero.
pub fn vwap_mid(book: &BookSnapshot) -> f64 {
    let total_qty = book.best_bid_qty + book.best_ask_qty;
    if total_qty <= 0.0 {
        return book.mid_price;
    }
    (book.best_bid * book.best_ask_qty + book.best_ask * book.best_bid_qty) / total_qty
}

/// Inventory-adjusted mid: weights toward the side with less resting
/// quantity, the side more likely to be consumed next.
pub fn micro_price(book: &BookSnapshot) -> f64 {
    let total_qty = book.best_bid_qty + book.best_ask_qty;
    if total_qty <= 0.0 {
        return book.mid_price;
    }
    let bid_weight = book.best_ask_qty / total_qty;
    let ask_weight = book.best_bid_qty / total_qty;
    book.best_bid * bid_weight + book.best_ask * ask_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(bid: f64, bid_qty: f64, ask: f64, ask_qty: f64) -> BookSnapshot {
        let mut s = BookSnapshot::empty(1);
        s.best_bid = bid;
        s.best_bid_qty = bid_qty;
        s.best_ask = ask;
        s.best_ask_qty = ask_qty;
        s.mid_price = (bid + ask) / 2.0;
        s
    }

    #[test]
    fn test_balanced_book_equals_mid() {
        let s = snap(100.0, 2.0, 102.0, 2.0);
        assert_eq!(vwap_mid(&s), 101.0);
        assert_eq!(micro_price(&s), 101.0);
    }

    #[test]
    fn test_micro_price_leans_to_thin_side() {
        // Thin ask: price should lean toward the ask.
        let s = snap(100.0, 9.0, 102.0, 1.0);
        assert!(micro_price(&s) > 101.0);
        // And vwap_mid leans the other way.
        assert!(vwap_mid(&s) < 101.0);
    }

    #[test]
    fn test_zero_quantities_fall_back_to_mid() {
        let s = snap(100.0, 0.0, 102.0, 0.0);
        assert_eq!(vwap_mid(&s), 101.0);
        assert_eq!(micro_price(&s), 101.0);
    }
}
