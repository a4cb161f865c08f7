//! Compute core: single-threaded dispatch over engine events.
//!
//! Owns the book, the trade-flow aggregator, and the sync gate. No I/O and
//! no locks — it is the sole consumer of the event ring, so everything here
//! is single-threaded by construction. Broadcasting goes through the
//! fan-out server, which does its own buffering.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::book::{BookSnapshot, OrderBook};
use crate::config::Config;
use crate::feed::control::FeedControl;
use crate::feed::messages::{AggTrade, DepthSnapshot, DepthUpdate, EngineEvent};
use crate::output::formatter;
use crate::output::{BroadcastServer, ConsoleReporter};
use crate::trade::{TradeFlow, TradeFlowMetrics};

/// Whether the replica is trusted to serve analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Snapshot pending; depth diffs are dropped until it lands.
    WaitingSnapshot,
    /// Replica is in lockstep with the stream.
    Synced,
}

pub struct ComputeCore {
    book: OrderBook,
    flow: TradeFlow,
    console: ConsoleReporter,
    control: Arc<FeedControl>,
    server: Arc<BroadcastServer>,
    sync: SyncState,
    last_processed_id: u64,
    metrics_interval: Duration,
    last_broadcast: Instant,
    force_metrics: bool,
}

impl ComputeCore {
    pub fn new(config: &Config, control: Arc<FeedControl>, server: Arc<BroadcastServer>) -> Self {
        Self {
            book: OrderBook::new(config.output.imbalance_levels),
            flow: TradeFlow::new(config.engine.vwap_window, config.engine.large_trade_std_devs),
            console: ConsoleReporter::new(config.output.metrics_interval()),
            control,
            server,
            sync: SyncState::WaitingSnapshot,
            last_processed_id: 0,
            metrics_interval: config.output.metrics_interval(),
            last_broadcast: Instant::now(),
            force_metrics: false,
        }
    }

    /// Dispatch one event. Returns `false` when the loop should exit.
    pub fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            EngineEvent::DepthUpdate(update) => self.on_depth_update(update),
            EngineEvent::AggTrade(trade) => self.on_trade(trade),
            EngineEvent::ConnectionLost { reason } => {
                self.console.log_connection_status(false, &reason);
                self.sync = SyncState::WaitingSnapshot;
                self.server
                    .broadcast(&formatter::format_status(false, "disconnected"));
            }
            EngineEvent::ConnectionRestored => {
                self.console.log_connection_status(true, "");
                self.sync = SyncState::WaitingSnapshot;
                self.server
                    .broadcast(&formatter::format_status(true, "connected"));
            }
            EngineEvent::SequenceGap { expected, received } => {
                warn!(expected, received, "sequence_gap_reported");
                self.resync();
            }
            EngineEvent::Shutdown => {
                info!("shutdown_event_received");
                return false;
            }
        }
        true
    }

    fn on_snapshot(&mut self, snapshot: DepthSnapshot) {
        info!(last_update_id = snapshot.last_update_id, "applying_snapshot");
        self.book.apply_snapshot(&snapshot);
        self.last_processed_id = snapshot.last_update_id;
        self.sync = SyncState::Synced;
        self.console.log_sync_status("synchronized");
        self.console.force_next();
        self.force_metrics = true;
    }

    fn on_depth_update(&mut self, update: DepthUpdate) {
        if self.sync != SyncState::Synced {
            return;
        }

        if self.last_processed_id > 0
            && self
                .book
                .has_sequence_gap(update.first_update_id, update.prev_final_update_id)
        {
            warn!(
                expected = self.last_processed_id,
                received = update.prev_final_update_id,
                "sequence_gap_detected"
            );
            self.resync();
            return;
        }

        self.book.apply_update(&update);
        self.last_processed_id = update.final_update_id;
    }

    fn on_trade(&mut self, trade: AggTrade) {
        if let Some(alert) = self.flow.process_trade(&trade) {
            self.console.log_alert(&alert);
            self.server.broadcast(&formatter::format_alert(&alert));
        }
    }

    /// The replica diverged: drop it, gate updates, and ask the feed for a
    /// fresh snapshot.
    fn resync(&mut self) {
        self.sync = SyncState::WaitingSnapshot;
        self.book.clear();
        self.control.request_resync();
    }

    /// Emit metrics if the interval elapsed (or a snapshot just forced it).
    /// Only meaningful while synced — a half-built book has no analytics.
    pub fn maybe_emit_metrics(&mut self) {
        if self.sync != SyncState::Synced {
            return;
        }

        let now = Instant::now();
        if !self.force_metrics && now.duration_since(self.last_broadcast) < self.metrics_interval {
            return;
        }
        self.force_metrics = false;
        self.last_broadcast = now;

        let book = self.book.snapshot();
        let flow = self.flow.current_metrics();
        self.console.log_metrics(&book, &flow);
        self.server.broadcast(&formatter::format_metrics(&book, &flow));
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub fn last_processed_id(&self) -> u64 {
        self.last_processed_id
    }

    pub fn book_snapshot(&mut self) -> BookSnapshot {
        self.book.snapshot()
    }

    pub fn flow_metrics(&self) -> TradeFlowMetrics {
        self.flow.current_metrics()
    }
}
