//! Upstream feed: wire records, parsing, and the synchronization state
//! machine that bridges the diff stream with REST snapshots.

pub mod backoff;
pub mod control;
pub mod endpoints;
pub mod handler;
pub mod messages;
pub mod parser;

pub use backoff::ReconnectPolicy;
pub use control::FeedControl;
pub use handler::FeedHandler;
pub use messages::{AggTrade, DepthSnapshot, DepthUpdate, EngineEvent, FeedState, PriceLevel};
