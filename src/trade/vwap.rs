//! Rolling VWAP over the most recent trades, with online size statistics.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct WindowTrade {
    price: f64,
    quantity: f64,
}

/// Window-limited VWAP plus Welford mean/variance over trade sizes.
///
/// Eviction reverses the Welford update instead of recomputing the window,
/// so `add_trade` stays O(1). The reversal is not bit-identical to a fresh
/// recomputation; `m2` is clamped at zero so float drift can never produce a
/// NaN standard deviation downstream.
#[derive(Debug)]
pub struct VwapCalculator {
    trades: VecDeque<WindowTrade>,
    window_size: usize,

    sum_pv: f64,
    sum_v: f64,

    // Welford state over trade sizes (not prices).
    mean: f64,
    m2: f64,
    count: usize,
}

impl VwapCalculator {
    pub fn new(window_size: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(window_size + 1),
            window_size,
            sum_pv: 0.0,
            sum_v: 0.0,
            mean: 0.0,
            m2: 0.0,
            count: 0,
        }
    }

    /// Add a trade; returns the updated VWAP.
    pub fn add_trade(&mut self, price: f64, quantity: f64) -> f64 {
        self.trades.push_back(WindowTrade { price, quantity });
        self.sum_pv += price * quantity;
        self.sum_v += quantity;

        self.count += 1;
        let delta = quantity - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = quantity - self.mean;
        self.m2 += delta * delta2;

        if self.trades.len() > self.window_size {
            let old = self.trades.pop_front().expect("window non-empty");

            self.sum_pv -= old.price * old.quantity;
            self.sum_v -= old.quantity;

            let old_delta = old.quantity - self.mean;
            self.count -= 1;
            if self.count > 0 {
                self.mean =
                    (self.mean * (self.count as f64 + 1.0) - old.quantity) / self.count as f64;
                let old_delta2 = old.quantity - self.mean;
                self.m2 -= old_delta * old_delta2;
                if self.m2 < 0.0 {
                    self.m2 = 0.0;
                }
            } else {
                self.mean = 0.0;
                self.m2 = 0.0;
            }
        }

        self.vwap()
    }

    /// Current VWAP; 0 when the window carries no volume.
    pub fn vwap(&self) -> f64 {
        if self.sum_v <= 0.0 {
            return 0.0;
        }
        self.sum_pv / self.sum_v
    }

    /// Total volume in the window.
    pub fn total_volume(&self) -> f64 {
        self.sum_v
    }

    /// Number of trades in the window.
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Rolling mean trade size.
    pub fn rolling_avg_size(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.mean
    }

    /// Rolling population standard deviation of trade sizes; 0 with fewer
    /// than two samples.
    pub fn rolling_std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
        self.sum_pv = 0.0;
        self.sum_v = 0.0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        let v = VwapCalculator::new(10);
        assert_eq!(v.vwap(), 0.0);
        assert_eq!(v.trade_count(), 0);
        assert_eq!(v.rolling_avg_size(), 0.0);
        assert_eq!(v.rolling_std_dev(), 0.0);
    }

    #[test]
    fn test_vwap_within_window() {
        let mut v = VwapCalculator::new(10);
        v.add_trade(100.0, 2.0);
        let vwap = v.add_trade(200.0, 2.0);
        // (100*2 + 200*2) / 4
        assert_eq!(vwap, 150.0);
        assert_eq!(v.total_volume(), 4.0);
    }

    #[test]
    fn test_vwap_weights_by_quantity() {
        let mut v = VwapCalculator::new(10);
        v.add_trade(100.0, 3.0);
        v.add_trade(200.0, 1.0);
        // (300 + 200) / 4
        assert_eq!(v.vwap(), 125.0);
    }

    #[test]
    fn test_sliding_window_evicts_oldest() {
        let mut v = VwapCalculator::new(3);
        v.add_trade(100.0, 1.0);
        v.add_trade(200.0, 1.0);
        v.add_trade(300.0, 1.0);
        assert_eq!(v.vwap(), 200.0);

        // Fourth trade pushes the 100 out.
        v.add_trade(400.0, 1.0);
        assert_eq!(v.vwap(), 300.0);
        assert_eq!(v.trade_count(), 3);
    }

    #[test]
    fn test_welford_mean_and_std_dev() {
        let mut v = VwapCalculator::new(100);
        for qty in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            v.add_trade(100.0, qty);
        }
        // Classic dataset: mean 5, population std dev 2.
        assert!((v.rolling_avg_size() - 5.0).abs() < 1e-9);
        assert!((v.rolling_std_dev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_std_dev_zero_below_two_samples() {
        let mut v = VwapCalculator::new(10);
        v.add_trade(100.0, 3.0);
        assert_eq!(v.rolling_std_dev(), 0.0);
        v.add_trade(100.0, 3.0);
        assert_eq!(v.rolling_std_dev(), 0.0); // identical sizes, zero variance
    }

    #[test]
    fn test_eviction_tracks_recomputation() {
        // After many evictions the drift-corrected stats must stay close to
        // a from-scratch computation over the surviving window.
        let mut v = VwapCalculator::new(5);
        let sizes: Vec<f64> = (1..=50).map(|i| (i % 7 + 1) as f64 * 0.5).collect();
        for &q in &sizes {
            v.add_trade(1000.0, q);
        }

        let window = &sizes[45..];
        let mean: f64 = window.iter().sum::<f64>() / window.len() as f64;
        let var: f64 =
            window.iter().map(|q| (q - mean) * (q - mean)).sum::<f64>() / window.len() as f64;

        assert!((v.rolling_avg_size() - mean).abs() < 1e-6);
        assert!((v.rolling_std_dev() - var.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_window_of_one() {
        let mut v = VwapCalculator::new(1);
        v.add_trade(100.0, 1.0);
        v.add_trade(200.0, 2.0);
        assert_eq!(v.vwap(), 200.0);
        assert_eq!(v.trade_count(), 1);
        assert_eq!(v.rolling_avg_size(), 2.0);
    }

    #[test]
    fn test_clear() {
        let mut v = VwapCalculator::new(3);
        v.add_trade(100.0, 1.0);
        v.clear();
        assert_eq!(v.vwap(), 0.0);
        assert_eq!(v.trade_count(), 0);
        assert_eq!(v.rolling_avg_size(), 0.0);
    }
}
