//! Single-shot wake-up timer.
//!
//! The engine keeps at most one pending wake-up. Scheduling replaces any
//! earlier deadline; the host polls [`WakeupTimer::deadline`] and calls back
//! into the engine once it has passed.

/// A cancellable single-shot deadline in host milliseconds.
pub trait WakeupTimer {
    /// Arm the timer, replacing any pending deadline.
    fn schedule(&mut self, host_deadline_ms: u64);

    fn cancel(&mut self);

    fn deadline(&self) -> Option<u64>;

    /// True once `host_now_ms` has reached the armed deadline.
    fn is_due(&self, host_now_ms: u64) -> bool {
        self.deadline().is_some_and(|deadline| host_now_ms >= deadline)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OneShotTimer {
    deadline: Option<u64>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WakeupTimer for OneShotTimer {
    fn schedule(&mut self, host_deadline_ms: u64) {
        self.deadline = Some(host_deadline_ms);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    fn deadline(&self) -> Option<u64> {
        self.deadline
    }
}
