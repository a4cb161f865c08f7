//! WebSocket broadcast fan-out to downstream subscribers.
//!
//! Runs on its own thread with its own event loop so a slow or misbehaving
//! subscriber can never block the compute core. Each subscriber gets a
//! bounded outbound queue drained by a writer task; `broadcast` serializes
//! the payload once and `try_send`s, evicting any subscriber whose queue is
//! full or closed. The server never acts on subscriber input — inbound
//! frames are drained purely to notice disconnects.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Outbound messages buffered per subscriber before it is considered slow.
const SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    tx: mpsc::Sender<String>,
}

struct Shared {
    port: u16,
    bound_port: AtomicU16,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    running: AtomicBool,
    shutdown: Notify,
    evictions: AtomicU64,
}

pub struct BroadcastServer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastServer {
    /// Construct without touching the network; `start` binds and listens.
    pub fn new(port: u16) -> Self {
        Self {
            shared: Arc::new(Shared {
                port,
                bound_port: AtomicU16::new(0),
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
                evictions: AtomicU64::new(0),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Bind the listen port and launch the broadcast thread. A bind failure
    /// is a fatal startup error and surfaces here, synchronously.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build broadcast runtime")?;

        let listener = rt
            .block_on(TcpListener::bind(("0.0.0.0", self.shared.port)))
            .with_context(|| format!("bind subscriber port {}", self.shared.port))?;

        let bound = listener.local_addr().map(|a| a.port()).unwrap_or(self.shared.port);
        self.shared.bound_port.store(bound, Ordering::Release);
        info!(port = bound, "ws_server_listening");

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("depthcast-broadcast".to_string())
            .spawn(move || {
                rt.block_on(accept_loop(shared, listener));
            })
            .context("spawn broadcast thread")?;

        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Serialize once, enqueue to every subscriber without blocking. A full
    /// or closed outbound queue evicts that subscriber.
    pub fn broadcast(&self, payload: &Value) {
        let mut subs = self.shared.subscribers.lock();
        if subs.is_empty() {
            return;
        }

        let msg = payload.to_string();
        let mut evicted: Vec<u64> = Vec::new();
        for (id, sub) in subs.iter() {
            if sub.tx.try_send(msg.clone()).is_err() {
                evicted.push(*id);
            }
        }
        for id in evicted {
            subs.remove(&id);
            self.shared.evictions.fetch_add(1, Ordering::Relaxed);
            warn!(subscriber = id, "subscriber_evicted");
        }
    }

    pub fn client_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    pub fn eviction_count(&self) -> u64 {
        self.shared.evictions.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Port actually bound (differs from the configured one when it was 0).
    pub fn local_port(&self) -> u16 {
        self.shared.bound_port.load(Ordering::Acquire)
    }

    /// Stop accepting, close all subscribers, join the thread. Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.shutdown.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.shared.subscribers.lock().clear();
        info!(evictions = self.eviction_count(), "ws_server_stopped");
    }

    #[cfg(test)]
    pub(crate) fn register_for_test(&self, tx: mpsc::Sender<String>) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().insert(id, Subscriber { tx });
        id
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        handle_subscriber(shared, stream, addr).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "subscriber_accept_failed");
                }
            }
        }
    }

    // Dropping the senders ends each writer task, which sends its close
    // frame; give them a beat to flush before the runtime is torn down.
    shared.subscribers.lock().clear();
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn handle_subscriber(shared: Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(peer = %addr, error = %e, "ws_handshake_failed");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(SUBSCRIBER_BUFFER);
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    shared.subscribers.lock().insert(id, Subscriber { tx });
    info!(subscriber = id, peer = %addr, "subscriber_connected");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // Discard whatever the subscriber sends; we only care about the close.
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    if shared.subscribers.lock().remove(&id).is_some() {
        info!(subscriber = id, "subscriber_disconnected");
    }
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let server = BroadcastServer::new(0);
        server.broadcast(&json!({"type": "metrics"}));
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.eviction_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_registered_subscriber() {
        let server = BroadcastServer::new(0);
        let (tx, mut rx) = mpsc::channel::<String>(8);
        server.register_for_test(tx);

        server.broadcast(&json!({"type": "status", "connected": true}));
        let msg = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(server.client_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_evicted() {
        let server = BroadcastServer::new(0);
        let (tx, _rx) = mpsc::channel::<String>(1);
        server.register_for_test(tx);

        // First fills the queue, second overflows it.
        server.broadcast(&json!({"seq": 1}));
        assert_eq!(server.client_count(), 1);
        server.broadcast(&json!({"seq": 2}));
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.eviction_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_subscriber_evicted() {
        let server = BroadcastServer::new(0);
        let (tx, rx) = mpsc::channel::<String>(8);
        server.register_for_test(tx);
        drop(rx);

        server.broadcast(&json!({"seq": 1}));
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_end_to_end_subscriber_receives_broadcast() {
        let server = BroadcastServer::new(0);
        server.start().unwrap();
        let port = server.local_port();
        assert!(port != 0);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
                .await
                .expect("connect to broadcast server");
            let (_tx, mut rx) = ws.split();

            // Wait for the server side to register the subscriber.
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while server.client_count() == 0 {
                assert!(std::time::Instant::now() < deadline, "subscriber never registered");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            server.broadcast(&json!({"type": "metrics", "book": {"bestBid": 42150.0}}));

            let frame = tokio::time::timeout(Duration::from_secs(5), rx.next())
                .await
                .expect("broadcast not received")
                .unwrap()
                .unwrap();
            let v: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            assert_eq!(v["book"]["bestBid"], 42150.0);
        });

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.client_count(), 0);
    }
}
