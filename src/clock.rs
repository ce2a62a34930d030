//! Time sources for the transition engine.
//!
//! The engine reasons in *logical* milliseconds: the host clock plus an offset
//! that is persisted periodically so elapsed time keeps moving forward across
//! restarts that reset the host clock. [`Clock`] abstracts the host clock so
//! simulations and tests can drive time explicitly.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    /// Current host time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Block for `duration` (or pretend to, for simulated clocks).
    fn sleep(&self, duration: Duration);

    fn is_simulated(&self) -> bool;
}

/// Milliseconds since process start. Resets on every restart.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Milliseconds since the Unix epoch. Survives restarts.
pub struct WallClock;

impl Clock for WallClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Simulated clock for accelerated runs and tests.
///
/// A multiplier of `0.0` selects fast-forward mode: `sleep` advances time
/// instantly. Any positive multiplier sleeps for the scaled real duration
/// (e.g. `60.0` = one simulated minute per real second).
pub struct SimulatedClock {
    current_ms: Mutex<u64>,
    multiplier: f64,
}

impl SimulatedClock {
    pub fn new(start_ms: u64, multiplier: f64) -> Self {
        Self {
            current_ms: Mutex::new(start_ms),
            multiplier: if multiplier.is_finite() && multiplier > 0.0 {
                multiplier
            } else {
                0.0
            },
        }
    }

    /// Fast-forward clock starting at `start_ms`.
    pub fn fast_forward(start_ms: u64) -> Self {
        Self::new(start_ms, 0.0)
    }

    pub fn advance(&self, duration_ms: u64) {
        let mut current = self.current_ms.lock().unwrap_or_else(|e| e.into_inner());
        *current = current.saturating_add(duration_ms);
    }

    pub fn set(&self, now_ms: u64) {
        let mut current = self.current_ms.lock().unwrap_or_else(|e| e.into_inner());
        *current = now_ms;
    }

    pub fn is_fast_forward(&self) -> bool {
        self.multiplier == 0.0
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> u64 {
        *self.current_ms.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        if !self.is_fast_forward() {
            let real = duration.as_secs_f64() / self.multiplier;
            if real > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(real));
            }
        }
        self.advance(duration.as_millis() as u64);
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Host clock plus a persisted correction.
///
/// `logical = host + offset`. When the host clock already persists across
/// restarts the offset stays at zero and is never persisted.
#[derive(Clone)]
pub struct LogicalClock {
    source: Arc<dyn Clock>,
    offset_ms: i64,
    persists: bool,
}

impl LogicalClock {
    pub fn new(source: Arc<dyn Clock>, persists: bool) -> Self {
        Self {
            source,
            offset_ms: 0,
            persists,
        }
    }

    pub fn now(&self) -> u64 {
        (self.source.now_ms() as i64).saturating_add(self.offset_ms).max(0) as u64
    }

    /// Convert a logical deadline back to host time.
    pub fn to_host(&self, logical_ms: u64) -> u64 {
        (logical_ms as i64).saturating_sub(self.offset_ms).max(0) as u64
    }

    /// Continue from a previously persisted logical reading.
    pub fn resume_from(&mut self, persisted_logical_ms: u64) {
        if self.persists {
            return;
        }
        self.offset_ms = persisted_logical_ms as i64 - self.source.now_ms() as i64;
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn persists(&self) -> bool {
        self.persists
    }

    pub fn source(&self) -> &Arc<dyn Clock> {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_fast_forward() {
        let clock = SimulatedClock::fast_forward(1_000);
        assert!(clock.is_simulated());
        clock.sleep(Duration::from_secs(60));
        assert_eq!(clock.now_ms(), 61_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 61_500);
    }

    #[test]
    fn test_invalid_multiplier_falls_back_to_fast_forward() {
        assert!(SimulatedClock::new(0, -3.0).is_fast_forward());
        assert!(SimulatedClock::new(0, f64::NAN).is_fast_forward());
        assert!(!SimulatedClock::new(0, 60.0).is_fast_forward());
    }

    #[test]
    fn test_logical_clock_resume() {
        let host = Arc::new(SimulatedClock::fast_forward(200));
        let mut clock = LogicalClock::new(host.clone(), false);
        assert_eq!(clock.now(), 200);

        // Persisted reading from a previous run that got further along
        clock.resume_from(90_200);
        assert_eq!(clock.now(), 90_200);
        assert_eq!(clock.to_host(90_700), 700);

        host.advance(1_000);
        assert_eq!(clock.now(), 91_200);
    }

    #[test]
    fn test_persistent_host_clock_ignores_resume() {
        let host = Arc::new(SimulatedClock::fast_forward(5_000));
        let mut clock = LogicalClock::new(host, true);
        clock.resume_from(1_000_000);
        assert_eq!(clock.offset_ms(), 0);
        assert_eq!(clock.now(), 5_000);
    }
}
