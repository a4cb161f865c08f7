//! Feed synchronization state machine.
//!
//! Owns the upstream WebSocket for one symbol and bridges it with the REST
//! depth snapshot under the venue's sequence-id contract:
//!
//! * while `WaitingSnapshot`, depth diffs are buffered and trades forwarded;
//! * on snapshot arrival the buffer is walked once — diffs entirely in the
//!   past are dropped, the bridging diff (`U <= last+1 <= u`) and everything
//!   after it are replayed;
//! * if the buffered stream starts after `last+1` the snapshot is already
//!   stale: re-request (buffer cleared).
//!
//! Runs on the network context. Downstream gap detection reaches it through
//! [`FeedControl`]; it never hands out references to itself.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::feed::backoff::ReconnectPolicy;
use crate::feed::control::FeedControl;
use crate::feed::endpoints;
use crate::feed::messages::{DepthSnapshot, DepthUpdate, EngineEvent, FeedState};
use crate::feed::parser::{self, StreamPayload};
use crate::queue::spsc::Producer;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SnapshotResult = Result<DepthSnapshot, String>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Counters for the connection lifetime, logged at shutdown.
#[derive(Debug, Default)]
pub struct FeedStats {
    pub frames_received: u64,
    pub parse_errors: u64,
    pub events_dropped: u64,
    pub connects: u64,
    pub reconnects: u64,
}

enum ConnectionOutcome {
    Shutdown,
    Lost(String),
}

/// Outcome of the post-snapshot buffer walk.
#[derive(Debug)]
pub enum SyncPlan {
    /// Diffs to replay in order, bridging diff first. Empty when nothing
    /// usable was buffered; live diffs then continue from the snapshot.
    Replay(Vec<DepthUpdate>),
    /// The oldest surviving diff starts after `last_update_id + 1`; the
    /// snapshot cannot be bridged to the stream.
    Gap { oldest_first_id: u64 },
}

/// Walk buffered diffs against a snapshot id. Pure, so the bridging rules
/// are testable without a socket.
pub fn plan_sync(buffered: Vec<DepthUpdate>, last_update_id: u64) -> SyncPlan {
    let mut replay = Vec::with_capacity(buffered.len());
    let mut bridged = false;

    for update in buffered {
        if !bridged {
            if update.final_update_id <= last_update_id {
                // Entirely covered by the snapshot.
                continue;
            }
            // Here u >= last+1; the bridging diff additionally needs
            // U <= last+1.
            if update.first_update_id <= last_update_id + 1 {
                bridged = true;
            } else {
                return SyncPlan::Gap {
                    oldest_first_id: update.first_update_id,
                };
            }
        }
        replay.push(update);
    }

    SyncPlan::Replay(replay)
}

pub struct FeedHandler {
    config: Config,
    control: Arc<FeedControl>,
    producer: Producer<EngineEvent>,
    backoff: ReconnectPolicy,
    buffered: Vec<DepthUpdate>,
    snapshot_inflight: bool,
    http: reqwest::Client,
    stats: FeedStats,
}

impl FeedHandler {
    pub fn new(config: Config, control: Arc<FeedControl>, producer: Producer<EngineEvent>) -> Self {
        let backoff = ReconnectPolicy::new(
            config.network.reconnect_delay_initial(),
            config.network.reconnect_delay_max(),
            config.network.reconnect_backoff_multiplier,
            config.network.reconnect_jitter_factor,
        );
        Self {
            config,
            control,
            producer,
            backoff,
            buffered: Vec::new(),
            snapshot_inflight: false,
            http: reqwest::Client::new(),
            stats: FeedStats::default(),
        }
    }

    /// Connect-and-stream until shutdown. Enqueues `Shutdown` as its final
    /// act so the compute context observes termination in-band.
    pub async fn run(&mut self) {
        let url = endpoints::ws_combined_url(&self.config.network);
        info!(symbol = %self.config.network.symbol, url = %url, "feed_starting");

        let control = Arc::clone(&self.control);
        while !control.shutdown_requested() {
            self.control.set_state(FeedState::Connecting);
            debug!("ws_connecting");

            let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url));
            let result = tokio::select! {
                r = connect => Some(r),
                _ = control.signal() => None,
            };

            match result {
                Some(Ok(Ok((ws, _response)))) => {
                    self.stats.connects += 1;
                    match self.run_connection(ws).await {
                        ConnectionOutcome::Shutdown => break,
                        ConnectionOutcome::Lost(reason) => {
                            self.stats.reconnects += 1;
                            self.emit(EngineEvent::ConnectionLost { reason });
                            self.reconnect_pause().await;
                        }
                    }
                }
                Some(Ok(Err(e))) => {
                    error!(error = %e, "ws_connect_failed");
                    self.emit(EngineEvent::ConnectionLost { reason: e.to_string() });
                    self.reconnect_pause().await;
                }
                Some(Err(_)) => {
                    error!(timeout_ms = CONNECT_TIMEOUT.as_millis() as u64, "ws_connect_timeout");
                    self.emit(EngineEvent::ConnectionLost {
                        reason: "connect timeout".to_string(),
                    });
                    self.reconnect_pause().await;
                }
                None => {
                    // Woken mid-connect; shutdown is re-checked at loop top.
                    let _ = control.take_resync();
                }
            }
        }

        self.control.set_state(FeedState::Disconnected);
        info!(
            frames = self.stats.frames_received,
            parse_errors = self.stats.parse_errors,
            dropped = self.stats.events_dropped,
            connects = self.stats.connects,
            reconnects = self.stats.reconnects,
            "feed_stopped"
        );
        self.push_shutdown().await;
    }

    async fn run_connection(&mut self, ws: WsStream) -> ConnectionOutcome {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let control = Arc::clone(&self.control);

        self.backoff.reset();
        self.buffered.clear();
        self.snapshot_inflight = false;
        self.control.set_state(FeedState::WaitingSnapshot);
        self.emit(EngineEvent::ConnectionRestored);
        info!("ws_connected");

        let (snap_tx, mut snap_rx) = mpsc::channel::<SnapshotResult>(2);
        self.spawn_snapshot_fetch(&snap_tx);

        loop {
            tokio::select! {
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_text(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            return ConnectionOutcome::Lost("pong send failed".to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(?frame, "ws_server_close");
                        return ConnectionOutcome::Lost("server closed connection".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "ws_read_error");
                        return ConnectionOutcome::Lost(e.to_string());
                    }
                    None => {
                        warn!("ws_stream_ended");
                        return ConnectionOutcome::Lost("stream ended".to_string());
                    }
                },
                Some(result) = snap_rx.recv() => {
                    self.snapshot_inflight = false;
                    match result {
                        Ok(snapshot) => self.on_snapshot(snapshot, &snap_tx),
                        Err(e) => {
                            error!(error = %e, "snapshot_fetch_failed");
                            return ConnectionOutcome::Lost(format!("snapshot fetch failed: {e}"));
                        }
                    }
                },
                _ = control.signal() => {
                    if control.shutdown_requested() {
                        return ConnectionOutcome::Shutdown;
                    }
                    if control.take_resync() {
                        info!("resync_requested");
                        self.request_snapshot(&snap_tx);
                    }
                }
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        self.stats.frames_received += 1;
        match parser::parse_stream_message(text) {
            Ok(StreamPayload::Depth(update)) => self.process_depth_update(update),
            // Trades are forwarded immediately in every connected state.
            Ok(StreamPayload::Trade(trade)) => self.emit(EngineEvent::AggTrade(trade)),
            Ok(StreamPayload::Unknown(stream)) => {
                debug!(stream = %stream, "unsubscribed_stream_frame");
            }
            Err(e) => {
                self.stats.parse_errors += 1;
                warn!(error = %e, "frame_parse_failed");
            }
        }
    }

    fn process_depth_update(&mut self, update: DepthUpdate) {
        match self.control.state() {
            FeedState::WaitingSnapshot => {
                trace!(final_update_id = update.final_update_id, "depth_update_buffered");
                self.buffered.push(update);
            }
            FeedState::Live => self.emit(EngineEvent::DepthUpdate(update)),
            _ => {}
        }
    }

    fn on_snapshot(&mut self, snapshot: DepthSnapshot, snap_tx: &mpsc::Sender<SnapshotResult>) {
        let last = snapshot.last_update_id;
        let buffered = std::mem::take(&mut self.buffered);
        info!(last_update_id = last, buffered = buffered.len(), "snapshot_received");

        self.control.set_state(FeedState::Syncing);
        self.emit(EngineEvent::Snapshot(snapshot));

        match plan_sync(buffered, last) {
            SyncPlan::Replay(updates) => {
                let replayed = updates.len();
                for update in updates {
                    self.emit(EngineEvent::DepthUpdate(update));
                }
                self.control.set_state(FeedState::Live);
                info!(last_update_id = last, replayed, "feed_live");
            }
            SyncPlan::Gap { oldest_first_id } => {
                warn!(
                    snapshot_last = last,
                    oldest_first_id, "snapshot_stream_gap"
                );
                self.request_snapshot(snap_tx);
            }
        }
    }

    /// Re-enter `WaitingSnapshot` and fetch a fresh snapshot. No-op while a
    /// request is already in flight.
    fn request_snapshot(&mut self, snap_tx: &mpsc::Sender<SnapshotResult>) {
        if self.snapshot_inflight {
            debug!("snapshot_request_already_inflight");
            return;
        }
        self.control.set_state(FeedState::WaitingSnapshot);
        self.buffered.clear();
        self.spawn_snapshot_fetch(snap_tx);
    }

    fn spawn_snapshot_fetch(&mut self, snap_tx: &mpsc::Sender<SnapshotResult>) {
        self.snapshot_inflight = true;
        let url = endpoints::rest_depth_url(&self.config.network, self.config.engine.depth_limit);
        let symbol = self.config.network.symbol.to_uppercase();
        let client = self.http.clone();
        let tx = snap_tx.clone();
        debug!(url = %url, "snapshot_requested");

        tokio::spawn(async move {
            let result = fetch_snapshot(&client, &url, &symbol).await;
            let _ = tx.send(result).await;
        });
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Err(dropped) = self.producer.try_push(event) {
            self.stats.events_dropped += 1;
            warn!(kind = dropped.kind(), "event_queue_full_dropping");
        }
    }

    /// The queue is drained by a live consumer, so a handful of retries is
    /// plenty; failure here only delays shutdown observation, never hangs
    /// it (the compute loop also watches the shutdown flag).
    async fn push_shutdown(&mut self) {
        let mut event = EngineEvent::Shutdown;
        for _ in 0..1000 {
            match self.producer.try_push(event) {
                Ok(()) => return,
                Err(e) => {
                    event = e;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
        error!("shutdown_event_enqueue_failed");
    }

    async fn reconnect_pause(&mut self) {
        self.control.set_state(FeedState::Reconnecting);
        let delay = self.backoff.next_delay();
        warn!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt_count(),
            "reconnect_scheduled"
        );
        let control = Arc::clone(&self.control);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = control.signal() => {}
        }
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }
}

async fn fetch_snapshot(client: &reqwest::Client, url: &str, symbol: &str) -> SnapshotResult {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    let body = response.text().await.map_err(|e| e.to_string())?;
    parser::parse_depth_snapshot(&body, symbol).map_err(|e| e.to_string())
}
