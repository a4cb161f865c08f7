//! depthcast — single-symbol market data engine for Binance Futures.
//!
//! Consumes the combined depth-diff and aggregated-trade streams plus REST
//! depth snapshots, maintains a locally-replicated order book with gap
//! recovery, derives book and trade-flow analytics, and re-publishes them
//! to WebSocket subscribers.
//!
//! Data flow:
//!
//! ```text
//! venue WS ─ parser ─ feed state machine ─▶ SPSC ring ─▶ compute core
//!                 REST snapshot ┘                        │
//!                                        book / VWAP / alerts
//!                                                        │
//!                                            formatter ─▶ WS fan-out ─▶ subscribers
//! ```
//!
//! Three execution contexts: a network thread owning the feed handler, a
//! compute thread owning all analytics state, and a broadcast thread owning
//! subscriber I/O. The only shared state is the event ring, the subscriber
//! set, the feed-control flags, and the published feed state.

pub mod book;
pub mod config;
pub mod core;
pub mod engine;
pub mod feed;
pub mod output;
pub mod queue;
pub mod trade;

pub use crate::config::Config;
pub use crate::core::FixedPrice;
pub use crate::engine::MarketDataEngine;
