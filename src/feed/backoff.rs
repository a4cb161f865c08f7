//! Exponential reconnect backoff with bounded random jitter.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Backoff calculator for WS reconnects.
///
/// The internal delay grows by `multiplier` on every draw and is never
/// re-capped; the cap is applied on read, so the effective delay plateaus at
/// `max` while the internal value keeps growing. Jitter spreads simultaneous
/// reconnects so a venue blip does not produce a thundering herd.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
    current: Duration,
    attempts: u32,
    rng_state: u64,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, multiplier: f64, jitter_factor: f64) -> Self {
        Self {
            base,
            max,
            multiplier,
            jitter_factor,
            current: base,
            attempts: 0,
            rng_state: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Fast PRNG for jitter (xorshift64), uniform in [0, 1).
    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Next delay to wait before reconnecting.
    ///
    /// Returns `floor(min(current, max) * j)` milliseconds with `j` uniform
    /// in `[1 - jitter, 1 + jitter]`, then grows the internal delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;

        let capped = self.current.min(self.max);
        let jitter = 1.0 - self.jitter_factor + 2.0 * self.jitter_factor * self.next_random();
        let delay_ms = (capped.as_millis() as f64 * jitter).floor() as u64;

        let next_ms = (self.current.as_millis() as f64 * self.multiplier) as u64;
        self.current = Duration::from_millis(next_ms);

        Duration::from_millis(delay_ms)
    }

    /// Reset to the base delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    /// Internal delay (uncapped, jitter-free).
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Attempts since the last reset.
    pub fn attempt_count(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(1000),
            Duration::from_millis(30_000),
            2.0,
            0.3,
        )
    }

    #[test]
    fn test_first_delay_within_jitter_band() {
        let mut p = policy();
        let d = p.next_delay();
        assert!(d.as_millis() >= 700 && d.as_millis() <= 1300, "{d:?}");
        assert_eq!(p.attempt_count(), 1);
    }

    #[test]
    fn test_delay_grows_then_plateaus() {
        let mut p = policy();
        for _ in 0..10 {
            let _ = p.next_delay();
        }
        // Internal delay keeps compounding past the cap...
        assert!(p.current_delay() > Duration::from_millis(30_000));
        // ...but the effective delay stays within the capped jitter band.
        let d = p.next_delay();
        assert!(d.as_millis() >= 21_000 && d.as_millis() <= 39_000, "{d:?}");
    }

    #[test]
    fn test_reset_restores_base() {
        let mut p = policy();
        let _ = p.next_delay();
        let _ = p.next_delay();
        p.reset();
        assert_eq!(p.current_delay(), Duration::from_millis(1000));
        assert_eq!(p.attempt_count(), 0);
        let d = p.next_delay();
        assert!(d.as_millis() >= 700 && d.as_millis() <= 1300, "{d:?}");
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let mut p = ReconnectPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            2.0,
            0.0,
        );
        assert_eq!(p.next_delay(), Duration::from_millis(100));
        assert_eq!(p.next_delay(), Duration::from_millis(200));
        assert_eq!(p.next_delay(), Duration::from_millis(400));
        assert_eq!(p.next_delay(), Duration::from_millis(800));
        // Capped from here on.
        assert_eq!(p.next_delay(), Duration::from_millis(800));
    }
}
