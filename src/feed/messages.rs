//! Typed records for the venue streams and the engine event bus.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::core::FixedPrice;

/// One price level: fixed-point price key, f64 quantity.
/// A quantity of zero means "remove this price".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: FixedPrice,
    pub qty: f64,
}

impl PriceLevel {
    pub fn new(price: FixedPrice, qty: f64) -> Self {
        Self { price, qty }
    }
}

/// Incremental diff from the `@depth` stream.
#[derive(Debug, Clone)]
pub struct DepthUpdate {
    pub event_time: u64,
    pub symbol: String,
    /// First update id in this event (`U`).
    pub first_update_id: u64,
    /// Final update id in this event (`u`).
    pub final_update_id: u64,
    /// Final update id of the previous event (`pu`); the sync contract is
    /// that consecutive events satisfy `B.pu == A.u`.
    pub prev_final_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Aggregated trade from the `@aggTrade` stream.
#[derive(Debug, Clone)]
pub struct AggTrade {
    pub event_time: u64,
    pub symbol: String,
    pub agg_trade_id: u64,
    pub price: f64,
    pub quantity: f64,
    pub first_trade_id: u64,
    pub last_trade_id: u64,
    pub trade_time: u64,
    /// `true` = the maker was the buyer, i.e. the aggressor sold.
    pub is_buyer_maker: bool,
}

impl AggTrade {
    /// Whether the taker was a buyer (aggressive buy).
    #[inline]
    pub fn is_buy(&self) -> bool {
        !self.is_buyer_maker
    }
}

/// Point-in-time book state from the REST depth endpoint.
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Sole payload of the network → compute channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    DepthUpdate(DepthUpdate),
    AggTrade(AggTrade),
    Snapshot(DepthSnapshot),
    ConnectionLost { reason: String },
    ConnectionRestored,
    SequenceGap { expected: u64, received: u64 },
    Shutdown,
}

impl EngineEvent {
    /// Short name for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::DepthUpdate(_) => "depth_update",
            EngineEvent::AggTrade(_) => "agg_trade",
            EngineEvent::Snapshot(_) => "snapshot",
            EngineEvent::ConnectionLost { .. } => "connection_lost",
            EngineEvent::ConnectionRestored => "connection_restored",
            EngineEvent::SequenceGap { .. } => "sequence_gap",
            EngineEvent::Shutdown => "shutdown",
        }
    }
}

/// Feed handler state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FeedState {
    /// Not connected, no activity scheduled.
    Disconnected = 0,
    /// TCP/TLS/WS handshake in progress.
    Connecting = 1,
    /// Connected, buffering diffs, waiting for the REST snapshot.
    WaitingSnapshot = 2,
    /// Snapshot received, replaying buffered diffs.
    Syncing = 3,
    /// Fully synchronized, forwarding diffs in real time.
    Live = 4,
    /// Connection lost, backing off before retry.
    Reconnecting = 5,
}

impl FeedState {
    fn from_u8(v: u8) -> FeedState {
        match v {
            1 => FeedState::Connecting,
            2 => FeedState::WaitingSnapshot,
            3 => FeedState::Syncing,
            4 => FeedState::Live,
            5 => FeedState::Reconnecting,
            _ => FeedState::Disconnected,
        }
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedState::Disconnected => "disconnected",
            FeedState::Connecting => "connecting",
            FeedState::WaitingSnapshot => "waiting_snapshot",
            FeedState::Syncing => "syncing",
            FeedState::Live => "live",
            FeedState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Lock-free cell publishing the current [`FeedState`] across threads.
#[derive(Debug)]
pub struct FeedStateCell(AtomicU8);

impl FeedStateCell {
    pub fn new(state: FeedState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> FeedState {
        FeedState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store the new state, returning the previous one.
    #[inline]
    pub fn swap(&self, state: FeedState) -> FeedState {
        FeedState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

impl Default for FeedStateCell {
    fn default() -> Self {
        Self::new(FeedState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EngineEvent::Shutdown.kind(), "shutdown");
        assert_eq!(EngineEvent::ConnectionRestored.kind(), "connection_restored");
        assert_eq!(
            EngineEvent::SequenceGap { expected: 1, received: 2 }.kind(),
            "sequence_gap"
        );
    }

    #[test]
    fn test_agg_trade_aggressor_side() {
        let mut t = AggTrade {
            event_time: 0,
            symbol: "BTCUSDT".into(),
            agg_trade_id: 1,
            price: 42_000.0,
            quantity: 1.0,
            first_trade_id: 1,
            last_trade_id: 1,
            trade_time: 0,
            is_buyer_maker: false,
        };
        assert!(t.is_buy());
        t.is_buyer_maker = true;
        assert!(!t.is_buy());
    }

    #[test]
    fn test_state_cell_round_trip() {
        let cell = FeedStateCell::default();
        assert_eq!(cell.load(), FeedState::Disconnected);
        assert_eq!(cell.swap(FeedState::Live), FeedState::Disconnected);
        assert_eq!(cell.load(), FeedState::Live);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(FeedState::WaitingSnapshot.to_string(), "waiting_snapshot");
        assert_eq!(FeedState::Live.to_string(), "live");
    }
}
