//! Engine orchestration: wires the three execution contexts together.
//!
//! * network thread — current-thread tokio runtime driving the feed handler
//!   (the calling thread; it produces into the event ring);
//! * compute thread — sole consumer of the ring, owns book and trade flow;
//! * broadcast thread — lives inside [`BroadcastServer`].
//!
//! Shutdown: a thread-safe flag plus notify stops the network loop, whose
//! final act is enqueueing `Shutdown` so the compute thread observes
//! termination in-band; the broadcast server is stopped last.

pub mod core;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::core::ComputeCore;
use crate::feed::control::FeedControl;
use crate::feed::handler::FeedHandler;
use crate::feed::messages::EngineEvent;
use crate::output::BroadcastServer;
use crate::queue::spsc::{self, Consumer};

pub use self::core::SyncState;

pub struct MarketDataEngine {
    config: Config,
    control: Arc<FeedControl>,
    server: Arc<BroadcastServer>,
}

impl MarketDataEngine {
    pub fn new(config: Config) -> Self {
        let server = Arc::new(BroadcastServer::new(config.output.ws_server_port));
        Self {
            config,
            control: Arc::new(FeedControl::new()),
            server,
        }
    }

    /// Shared control handle, e.g. for an external shutdown trigger.
    pub fn control(&self) -> Arc<FeedControl> {
        Arc::clone(&self.control)
    }

    /// Thread-safe graceful shutdown request.
    pub fn request_shutdown(&self) {
        self.control.request_shutdown();
    }

    /// Run until shutdown. Blocks the calling thread, which becomes the
    /// network context.
    pub fn run(&mut self) -> Result<()> {
        info!(
            symbol = %self.config.network.symbol,
            ws_server_port = self.config.output.ws_server_port,
            "engine_starting"
        );

        self.server.start()?;

        let (producer, consumer) =
            spsc::channel::<EngineEvent>(self.config.engine.queue_capacity);

        let core = ComputeCore::new(
            &self.config,
            Arc::clone(&self.control),
            Arc::clone(&self.server),
        );
        let compute_control = Arc::clone(&self.control);
        let compute = thread::Builder::new()
            .name("depthcast-compute".to_string())
            .spawn(move || compute_loop(consumer, core, compute_control))
            .context("spawn compute thread")?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build network runtime")?;

        let mut handler =
            FeedHandler::new(self.config.clone(), Arc::clone(&self.control), producer);
        let signal_control = Arc::clone(&self.control);

        rt.block_on(async move {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown_signal_received");
                    signal_control.request_shutdown();
                }
            });
            handler.run().await;
        });

        if compute.join().is_err() {
            error!("compute_thread_panicked");
        }
        self.server.stop();

        info!("engine_stopped");
        Ok(())
    }
}

/// The compute loop never blocks on I/O: it polls the ring and sleeps
/// briefly when idle, emitting metrics between drains.
fn compute_loop(
    mut consumer: Consumer<EngineEvent>,
    mut core: ComputeCore,
    control: Arc<FeedControl>,
) {
    debug!("compute_thread_started");

    loop {
        match consumer.try_pop() {
            Some(event) => {
                if !core.handle_event(event) {
                    break;
                }
            }
            None => {
                core.maybe_emit_metrics();
                // Backstop in case the in-band Shutdown was never enqueued.
                if control.shutdown_requested() && consumer.is_empty() {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    debug!("compute_thread_stopped");
}
