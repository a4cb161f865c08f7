//! Rate-limited console reporting of engine state.
//!
//! Alerts and connection transitions always log; the metrics line is capped
//! to one per interval so a busy book does not flood the console.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::book::BookSnapshot;
use crate::trade::{TradeAlert, TradeFlowMetrics};

#[derive(Debug)]
pub struct ConsoleReporter {
    interval: Duration,
    last_output: Instant,
    force_next: bool,
}

impl ConsoleReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_output: Instant::now(),
            // First metrics line always prints.
            force_next: true,
        }
    }

    /// Log current metrics unless rate-limited. Returns whether it logged.
    pub fn log_metrics(&mut self, book: &BookSnapshot, flow: &TradeFlowMetrics) -> bool {
        let now = Instant::now();
        if !self.force_next && now.duration_since(self.last_output) < self.interval {
            return false;
        }
        self.force_next = false;
        self.last_output = now;

        info!(
            best_bid = book.best_bid,
            best_ask = book.best_ask,
            spread_bps = %format!("{:.4}", book.spread_bps),
            imbalance = %format!("{:.3}", book.imbalance),
            vwap = flow.vwap,
            net_flow = flow.net_flow,
            trades = flow.trade_count,
            last_update_id = book.last_update_id,
            "metrics"
        );
        true
    }

    pub fn log_alert(&self, alert: &TradeAlert) {
        warn!(
            side = if alert.is_buy { "BUY" } else { "SELL" },
            price = alert.price,
            quantity = alert.quantity,
            sigma = %format!("{:.2}", alert.sigma),
            "large_trade"
        );
    }

    pub fn log_connection_status(&self, connected: bool, details: &str) {
        if connected {
            info!("upstream_connected");
        } else {
            warn!(reason = details, "upstream_disconnected");
        }
    }

    pub fn log_sync_status(&self, status: &str) {
        info!(status, "sync_status");
    }

    /// Make the next `log_metrics` bypass the rate limit.
    pub fn force_next(&mut self) {
        self.force_next = true;
    }
}
