//! Cross-thread control surface for the feed handler.
//!
//! The compute core never holds a reference into the handler; it raises
//! flags here and wakes the network task. This keeps ownership acyclic: the
//! handler exclusively owns its WS client, and callbacks are messages, not
//! back-references.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::feed::messages::{FeedState, FeedStateCell};

#[derive(Debug, Default)]
pub struct FeedControl {
    resync_requested: AtomicBool,
    shutdown: AtomicBool,
    notify: Notify,
    state: FeedStateCell,
}

impl FeedControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the feed to re-enter `WaitingSnapshot` (gap detected downstream).
    /// Thread-safe; wakes the network task.
    pub fn request_resync(&self) {
        self.resync_requested.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Consume a pending resync request.
    pub fn take_resync(&self) -> bool {
        self.resync_requested.swap(false, Ordering::AcqRel)
    }

    /// Whether a resync is pending (tests and diagnostics).
    pub fn resync_pending(&self) -> bool {
        self.resync_requested.load(Ordering::Acquire)
    }

    /// Request engine shutdown. Thread-safe and idempotent.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wait until some control flag may have changed.
    pub async fn signal(&self) {
        self.notify.notified().await;
    }

    #[inline]
    pub fn state(&self) -> FeedState {
        self.state.load()
    }

    /// Publish a new feed state; returns the previous one.
    pub fn set_state(&self, state: FeedState) -> FeedState {
        self.state.swap(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_flag_is_consumed_once() {
        let c = FeedControl::new();
        assert!(!c.resync_pending());
        c.request_resync();
        assert!(c.resync_pending());
        assert!(c.take_resync());
        assert!(!c.take_resync());
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let c = FeedControl::new();
        c.request_shutdown();
        assert!(c.shutdown_requested());
        assert!(c.shutdown_requested());
    }

    #[tokio::test]
    async fn test_signal_wakes_after_request() {
        let c = std::sync::Arc::new(FeedControl::new());
        let waiter = std::sync::Arc::clone(&c);
        // Permit is stored even when nobody is waiting yet.
        c.request_resync();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter.signal())
            .await
            .expect("signal should complete");
        assert!(c.take_resync());
    }
}
