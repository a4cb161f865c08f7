//! Trade-flow aggregation: VWAP, directional volume, alerting.

use crate::feed::messages::AggTrade;
use crate::trade::alert::{AlertDetector, TradeAlert};
use crate::trade::vwap::VwapCalculator;

/// Aggregated view of recent trade flow.
#[derive(Debug, Clone)]
pub struct TradeFlowMetrics {
    pub vwap: f64,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
    /// Buy volume minus sell volume.
    pub net_flow: f64,
    pub trade_count: usize,
    pub last_alert: Option<TradeAlert>,
}

/// Processes the aggregated-trade stream: feeds the rolling VWAP window,
/// splits volume by aggressor side, and runs the large-trade detector.
#[derive(Debug)]
pub struct TradeFlow {
    vwap: VwapCalculator,
    detector: AlertDetector,
    total_buy_volume: f64,
    total_sell_volume: f64,
    last_alert: Option<TradeAlert>,
}

impl TradeFlow {
    pub fn new(vwap_window: usize, large_trade_std_devs: f64) -> Self {
        Self {
            vwap: VwapCalculator::new(vwap_window),
            detector: AlertDetector::new(large_trade_std_devs),
            total_buy_volume: 0.0,
            total_sell_volume: 0.0,
            last_alert: None,
        }
    }

    /// Process one trade. Returns the alert fired by *this* trade, if any —
    /// retained history is available through
    /// [`current_metrics`](Self::current_metrics).
    pub fn process_trade(&mut self, trade: &AggTrade) -> Option<TradeAlert> {
        self.vwap.add_trade(trade.price, trade.quantity);

        let is_buy = trade.is_buy();
        if is_buy {
            self.total_buy_volume += trade.quantity;
        } else {
            self.total_sell_volume += trade.quantity;
        }

        let alert = self.detector.check_trade(
            trade.price,
            trade.quantity,
            is_buy,
            self.vwap.rolling_avg_size(),
            self.vwap.rolling_std_dev(),
        );

        if let Some(a) = alert {
            self.last_alert = Some(a);
        }
        alert
    }

    pub fn current_metrics(&self) -> TradeFlowMetrics {
        TradeFlowMetrics {
            vwap: self.vwap.vwap(),
            total_buy_volume: self.total_buy_volume,
            total_sell_volume: self.total_sell_volume,
            net_flow: self.total_buy_volume - self.total_sell_volume,
            trade_count: self.vwap.trade_count(),
            last_alert: self.last_alert,
        }
    }

    pub fn reset(&mut self) {
        self.vwap.clear();
        self.total_buy_volume = 0.0;
        self.total_sell_volume = 0.0;
        self.last_alert = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(price: f64, qty: f64, is_buyer_maker: bool) -> AggTrade {
        AggTrade {
            event_time: 0,
            symbol: "BTCUSDT".into(),
            agg_trade_id: 0,
            price,
            quantity: qty,
            first_trade_id: 0,
            last_trade_id: 0,
            trade_time: 0,
            is_buyer_maker,
        }
    }

    #[test]
    fn test_volume_split_by_aggressor() {
        let mut flow = TradeFlow::new(100, 2.0);
        flow.process_trade(&trade(100.0, 2.0, false)); // taker bought
        flow.process_trade(&trade(100.0, 3.0, true)); // taker sold

        let m = flow.current_metrics();
        assert_eq!(m.total_buy_volume, 2.0);
        assert_eq!(m.total_sell_volume, 3.0);
        assert_eq!(m.net_flow, -1.0);
        assert_eq!(m.trade_count, 2);
    }

    #[test]
    fn test_alert_fires_once_per_trigger() {
        let mut flow = TradeFlow::new(100, 2.0);
        // Uniform baseline with a little variance so std_dev > 0.
        for i in 0..10 {
            let qty = if i % 2 == 0 { 1.0 } else { 1.2 };
            assert!(flow.process_trade(&trade(100.0, qty, true)).is_none());
        }

        // Outsized trade: alert fires for this trade only.
        let alert = flow.process_trade(&trade(100.0, 50.0, false)).unwrap();
        assert!(alert.sigma > 2.0);
        assert!(!alert.is_buy);

        // Next normal trade does not re-fire, but the history is retained.
        assert!(flow.process_trade(&trade(100.0, 1.0, true)).is_none());
        assert!(flow.current_metrics().last_alert.is_some());
    }

    #[test]
    fn test_no_alert_on_uniform_sizes() {
        let mut flow = TradeFlow::new(100, 2.0);
        for _ in 0..20 {
            assert!(flow.process_trade(&trade(100.0, 1.0, true)).is_none());
        }
    }

    #[test]
    fn test_reset() {
        let mut flow = TradeFlow::new(100, 2.0);
        flow.process_trade(&trade(100.0, 2.0, false));
        flow.reset();

        let m = flow.current_metrics();
        assert_eq!(m.vwap, 0.0);
        assert_eq!(m.total_buy_volume, 0.0);
        assert_eq!(m.trade_count, 0);
        assert!(m.last_alert.is_none());
    }
}
