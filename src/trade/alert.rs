//! Sigma-thresholded large-trade detection.

use chrono::{DateTime, Utc};

/// A trade whose size stood out against the rolling distribution.
#[derive(Debug, Clone, Copy)]
pub struct TradeAlert {
    pub price: f64,
    pub quantity: f64,
    pub is_buy: bool,
    /// Standard deviations above the rolling mean size.
    pub sigma: f64,
    pub timestamp: DateTime<Utc>,
}

/// Flags trades whose size exceeds `threshold` standard deviations above the
/// rolling mean. Undersized trades never alert, and neither does anything
/// while the rolling std-dev is zero (too few or identical samples).
#[derive(Debug)]
pub struct AlertDetector {
    threshold: f64,
}

impl AlertDetector {
    pub fn new(std_dev_threshold: f64) -> Self {
        Self {
            threshold: std_dev_threshold,
        }
    }

    pub fn check_trade(
        &self,
        price: f64,
        quantity: f64,
        is_buy: bool,
        rolling_avg: f64,
        rolling_std_dev: f64,
    ) -> Option<TradeAlert> {
        if rolling_std_dev <= 0.0 {
            return None;
        }

        let sigma = (quantity - rolling_avg) / rolling_std_dev;
        if sigma > self.threshold {
            Some(TradeAlert {
                price,
                quantity,
                is_buy,
                sigma,
                timestamp: Utc::now(),
            })
        } else {
            None
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
