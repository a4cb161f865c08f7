//! Analytics → subscriber JSON payloads. Pure functions, no I/O.

use chrono::Utc;
use serde_json::{json, Value};

use crate::book::BookSnapshot;
use crate::trade::{TradeAlert, TradeFlowMetrics};

/// Current UTC time as ISO-8601 with milliseconds, e.g.
/// `2026-08-02T09:15:42.137Z`.
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Periodic metrics payload: best-of-book analytics plus trade flow.
pub fn format_metrics(book: &BookSnapshot, flow: &TradeFlowMetrics) -> Value {
    json!({
        "type": "metrics",
        "timestamp": iso_timestamp(),
        "book": {
            "bestBid": book.best_bid,
            "bestBidQty": book.best_bid_qty,
            "bestAsk": book.best_ask,
            "bestAskQty": book.best_ask_qty,
            "spread": book.spread,
            "spreadBps": book.spread_bps,
            "midPrice": book.mid_price,
            "imbalance": book.imbalance,
            "lastUpdateId": book.last_update_id,
        },
        "trade": {
            "vwap": flow.vwap,
            "buyVolume": flow.total_buy_volume,
            "sellVolume": flow.total_sell_volume,
            "netFlow": flow.net_flow,
            "tradeCount": flow.trade_count,
        },
    })
}

/// Large-trade alert payload.
pub fn format_alert(alert: &TradeAlert) -> Value {
    json!({
        "type": "alert",
        "timestamp": iso_timestamp(),
        "side": if alert.is_buy { "BUY" } else { "SELL" },
        "price": alert.price,
        "quantity": alert.quantity,
        "sigma": alert.sigma,
    })
}

/// Upstream connection status payload.
pub fn format_status(connected: bool, state: &str) -> Value {
    json!({
        "type": "status",
        "timestamp": iso_timestamp(),
        "connected": connected,
        "state": state,
    })
}
