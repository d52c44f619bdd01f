//! Fault decisions for the TCP proxy: at-accept and per-chunk.

use faultline_core::TcpFaults;
use rand::Rng;
use std::time::{Duration, Instant};

/// Whether a freshly accepted connection should be refused outright,
/// before any latency sleep or dial attempt.
pub fn should_refuse(faults: &TcpFaults) -> bool {
    faults.refuse_connections
}

/// Whether a connection (past the refuse check and the initial latency
/// sleep) should be reset instead of dialing upstream.
pub fn should_reset(faults: &TcpFaults) -> bool {
    faults.reset_probability > 0.0 && rand::thread_rng().gen_bool(faults.reset_probability)
}

/// Whether a single chunk of data in flight should be silently dropped
/// (consumed from the read side but never written to the other side).
pub fn should_drop_chunk(faults: &TcpFaults) -> bool {
    faults.drop_probability > 0.0 && rand::thread_rng().gen_bool(faults.drop_probability)
}

/// A token-bucket-free bandwidth cap: tracks bytes sent in the current
/// one-second window and reports how long to sleep before the window has
/// room for another chunk. Simpler than a true token bucket and sufficient
/// for the coarse per-connection throttling this proxy models.
pub struct BandwidthThrottle {
    limit_bytes_per_sec: u64,
    window_start: Instant,
    bytes_in_window: u64,
}

impl BandwidthThrottle {
    pub fn new(kbps: u64) -> Self {
        Self {
            limit_bytes_per_sec: kbps.saturating_mul(1024),
            window_start: Instant::now(),
            bytes_in_window: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Record `n` bytes just transferred; returns how long the caller
    /// should sleep before the next chunk to stay under the configured cap.
    pub fn record(&mut self, n: usize) -> Duration {
        if self.limit_bytes_per_sec == 0 {
            return Duration::ZERO;
        }
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.bytes_in_window = 0;
        }
        self.bytes_in_window += n as u64;
        if self.bytes_in_window > self.limit_bytes_per_sec {
            let elapsed = now.duration_since(self.window_start);
            Duration::from_secs(1).saturating_sub(elapsed)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faults(refuse: bool, reset_p: f64, drop_p: f64) -> TcpFaults {
        TcpFaults {
            latency_ms: 0,
            drop_probability: drop_p,
            reset_probability: reset_p,
            bandwidth_kbps: 0,
            refuse_connections: refuse,
        }
    }

    #[test]
    fn refuse_flag_is_independent_of_reset_probability() {
        let f = faults(true, 1.0, 0.0);
        assert!(should_refuse(&f));
    }

    #[test]
    fn reset_probability_one_always_resets() {
        let f = faults(false, 1.0, 0.0);
        assert!(should_reset(&f));
    }

    #[test]
    fn zero_probabilities_never_reset_or_drop() {
        let f = faults(false, 0.0, 0.0);
        for _ in 0..50 {
            assert!(!should_refuse(&f));
            assert!(!should_reset(&f));
            assert!(!should_drop_chunk(&f));
        }
    }

    #[test]
    fn drop_probability_one_always_drops() {
        let f = faults(false, 0.0, 1.0);
        for _ in 0..50 {
            assert!(should_drop_chunk(&f));
        }
    }

    #[test]
    fn disabled_throttle_never_sleeps() {
        let mut throttle = BandwidthThrottle::disabled();
        assert_eq!(throttle.record(1_000_000), Duration::ZERO);
    }

    #[test]
    fn throttle_triggers_once_cap_exceeded() {
        let mut throttle = BandwidthThrottle::new(8); // 8 * 1024 = 8192 bytes/sec
        assert_eq!(throttle.record(4000), Duration::ZERO);
        assert!(throttle.record(5000) > Duration::ZERO);
    }
}
