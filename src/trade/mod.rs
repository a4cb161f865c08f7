//! Trade-flow analytics: rolling VWAP, online size statistics, alerting.

pub mod alert;
pub mod flow;
pub mod vwap;

pub use alert::{AlertDetector, TradeAlert};
pub use flow::{TradeFlow, TradeFlowMetrics};
pub use vwap::VwapCalculator;
