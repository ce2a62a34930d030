//! Host loop driving an engine against a clock.
//!
//! [`Runner`] sleeps until the engine's next wake-up (transition timer or
//! periodic clock write), polls it, and repeats until asked to stop, the
//! optional end time passes, or a simulated run has nothing left to do.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::callbacks::TransitionCallbacks;
use crate::clock::Clock;
use crate::common::constants::MAX_SLEEP_SLICE_MS;
use crate::engine::AdaptiveLight;
use crate::persistence::KeyValueStore;
use crate::timer::WakeupTimer;

/// Why [`Runner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown flag was raised
    Shutdown,
    /// The configured end time was reached
    EndReached,
    /// A simulated run had no transitions left and no end time
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    /// Number of transition timer expiries handled
    pub timer_fires: usize,
    /// Host time at which the loop stopped
    pub stopped_at_ms: u64,
}

/// Register SIGINT and SIGTERM to raise the returned flag.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("Failed to register SIGTERM handler")?;
    Ok(shutdown)
}

pub struct Runner {
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
    end_at_ms: Option<u64>,
}

impl Runner {
    pub fn new(clock: Arc<dyn Clock>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            clock,
            shutdown,
            end_at_ms: None,
        }
    }

    /// Stop once host time reaches `end_at_ms`.
    pub fn until(mut self, end_at_ms: u64) -> Self {
        self.end_at_ms = Some(end_at_ms);
        self
    }

    pub fn run<C, S, T>(&self, engine: &mut AdaptiveLight<C, S, T>) -> Result<RunSummary>
    where
        C: TransitionCallbacks,
        S: KeyValueStore,
        T: WakeupTimer,
    {
        let mut timer_fires = 0;
        loop {
            let now = self.clock.now_ms();
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(RunSummary {
                    reason: StopReason::Shutdown,
                    timer_fires,
                    stopped_at_ms: now,
                });
            }

            if engine
                .poll(now)
                .with_context(|| format!("Engine update failed at {now} ms"))?
            {
                timer_fires += 1;
            }

            let reason = match self.end_at_ms {
                Some(end) if now >= end => Some(StopReason::EndReached),
                None if self.clock.is_simulated() && engine.transition_count() == 0 => {
                    Some(StopReason::Idle)
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Ok(RunSummary {
                    reason,
                    timer_fires,
                    stopped_at_ms: now,
                });
            }

            let deadline = match (engine.next_wakeup(), self.end_at_ms) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let mut wait_ms = match deadline {
                Some(deadline) => deadline.saturating_sub(now).max(1),
                None => MAX_SLEEP_SLICE_MS,
            };
            if !self.clock.is_simulated() {
                wait_ms = wait_ms.min(MAX_SLEEP_SLICE_MS);
            }
            self.clock.sleep(Duration::from_millis(wait_ms));
        }
    }
}
