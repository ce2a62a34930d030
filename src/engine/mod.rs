//! The adaptive lighting engine.
//!
//! [`AdaptiveLight`] owns the live transitions of one accessory and drives
//! them against a [`LogicalClock`]. Controllers talk to it through TLV8 writes
//! and reads ([`AdaptiveLight::handle_write`], [`AdaptiveLight::handle_read`]);
//! the host reports timer expiry ([`AdaptiveLight::handle_timer`]) and changes
//! of characteristics that derived transitions follow
//! ([`AdaptiveLight::handle_source_value_change`]).
//!
//! Every mutation runs to completion before the next one starts. The engine is
//! not `Sync`; hosts with several event sources serialize access themselves.

mod scheduler;
mod snapshot;

#[cfg(test)]
mod tests;

pub use snapshot::{EngineSnapshot, TransitionSnapshot};

use crate::callbacks::TransitionCallbacks;
use crate::clock::LogicalClock;
use crate::common::constants::{
    DEFAULT_CLOCK_PERSIST_INTERVAL_SECS, DEFAULT_MAX_TRANSITION_POINTS, DEFAULT_MAX_TRANSITIONS,
    MAX_RESPONSE_BYTES, MAX_STORAGE_SLOTS,
};
use crate::error::{AdaptiveLightError, Result};
use crate::persistence::{self, KeyValueStore, PersistedTransition};
use crate::service::ServiceDescriptor;
use crate::timer::{OneShotTimer, WakeupTimer};
use crate::transition::codec::{
    RestoreContext, WriteOperation, encode_fetch_response, encode_supported,
    encode_transition_state, parse_transition, parse_write_request,
};
use crate::transition::validation::{CapacityPlan, ValidationContext, validate_transition};
use crate::transition::{ActiveContext, SlotId, SupportedTransition, TransitionStore};

/// Static parameters of one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub service: ServiceDescriptor,
    pub supported: Vec<SupportedTransition>,
    pub max_transitions: usize,
    pub max_transition_points: usize,
    /// How often the logical clock is written to storage, in ms
    pub clock_persist_interval_ms: u64,
    pub response_limit: usize,
}

impl EngineSettings {
    pub fn new(service: ServiceDescriptor, supported: Vec<SupportedTransition>) -> Self {
        Self {
            service,
            supported,
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            max_transition_points: DEFAULT_MAX_TRANSITION_POINTS,
            clock_persist_interval_ms: DEFAULT_CLOCK_PERSIST_INTERVAL_SECS * 1_000,
            response_limit: MAX_RESPONSE_BYTES,
        }
    }

    /// Pool capacities. Live transitions are capped at the number of storage
    /// slots.
    pub fn with_capacity(mut self, max_transitions: usize, max_transition_points: usize) -> Self {
        if max_transitions > MAX_STORAGE_SLOTS {
            log_warning!(
                "max_transitions {} exceeds the {} storage slots, using {}",
                max_transitions,
                MAX_STORAGE_SLOTS,
                MAX_STORAGE_SLOTS
            );
        }
        self.max_transitions = max_transitions.min(MAX_STORAGE_SLOTS);
        self.max_transition_points = max_transition_points;
        self
    }

    fn supports(&self, characteristic_id: u64) -> bool {
        self.supported
            .iter()
            .any(|s| s.characteristic_id == characteristic_id)
    }
}

/// What the next control-point read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingResponse {
    #[default]
    State,
    Transition(u64),
}

pub struct AdaptiveLight<C, S, T = OneShotTimer>
where
    C: TransitionCallbacks,
    S: KeyValueStore,
    T: WakeupTimer,
{
    settings: EngineSettings,
    callbacks: C,
    storage: S,
    clock: LogicalClock,
    live: TransitionStore,
    timer: T,
    pending: PendingResponse,
    next_clock_persist_at: u64,
}

impl<C, S> AdaptiveLight<C, S, OneShotTimer>
where
    C: TransitionCallbacks,
    S: KeyValueStore,
{
    pub fn new(settings: EngineSettings, callbacks: C, storage: S, clock: LogicalClock) -> Self {
        Self::with_timer(settings, callbacks, storage, clock, OneShotTimer::new())
    }
}

impl<C, S, T> AdaptiveLight<C, S, T>
where
    C: TransitionCallbacks,
    S: KeyValueStore,
    T: WakeupTimer,
{
    pub fn with_timer(
        settings: EngineSettings,
        callbacks: C,
        storage: S,
        clock: LogicalClock,
        timer: T,
    ) -> Self {
        let live = TransitionStore::new(settings.max_transitions, settings.max_transition_points);
        Self {
            settings,
            callbacks,
            storage,
            clock,
            live,
            timer,
            pending: PendingResponse::State,
            next_clock_persist_at: 0,
        }
    }

    /// Resume the logical clock, restore persisted transitions and arm the
    /// timer. Returns the number of restored transitions.
    ///
    /// Records that fail to parse or validate are logged and skipped; only
    /// storage failures abort.
    pub fn initialize(&mut self) -> Result<usize> {
        if !self.clock.persists()
            && let Some(persisted) = persistence::load_clock(&self.storage)?
        {
            self.clock.resume_from(persisted);
            log_debug!(
                "Resumed logical clock at {} ms (offset {} ms)",
                persisted,
                self.clock.offset_ms()
            );
        }

        let records = persistence::load_records(&self.storage, self.settings.max_transitions)?;
        let mut restored = 0;
        for record in records {
            match self.restore(&record) {
                Ok(()) => restored += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log_warning!(
                        "Discarding stored transition for characteristic {}: {}",
                        record.characteristic_id,
                        e
                    );
                }
            }
        }
        if restored > 0 {
            log_decorated!("Restored {} transition(s) from storage", restored);
        }

        self.next_clock_persist_at = self
            .clock
            .now()
            .saturating_add(self.settings.clock_persist_interval_ms);
        self.recompute()?;
        Ok(restored)
    }

    fn restore(&mut self, record: &PersistedTransition) -> Result<()> {
        let context = RestoreContext {
            request_time: record.request_time,
            threshold: record.threshold,
            service_id: record.service_id,
        };
        let mut staging = self.staging_store();
        let now = self.clock.now();
        let callbacks = &mut self.callbacks;
        let id = parse_transition(
            &record.entry,
            &mut staging,
            now,
            record.service_id,
            Some(&context),
            |characteristic_id| callbacks.value_request(characteristic_id),
        )?;

        let transition = staging
            .get(id)
            .ok_or_else(|| AdaptiveLightError::invalid("restored transition vanished"))?;
        if transition.characteristic_id != record.characteristic_id {
            return Err(AdaptiveLightError::invalid(format!(
                "record for characteristic {} holds characteristic {}",
                record.characteristic_id, transition.characteristic_id
            )));
        }

        let plan = CapacityPlan::from_store(&self.live);
        let ctx = ValidationContext {
            service: None,
            supported: &self.settings.supported,
            available_points: plan.available_for(record.characteristic_id),
        };
        validate_transition(transition, &staging.points, &ctx)?;
        self.commit(&staging, id, None)
    }

    fn staging_store(&self) -> TransitionStore {
        TransitionStore::new(
            self.settings.max_transitions,
            self.settings.max_transition_points,
        )
    }

    /// Apply a control-point write.
    ///
    /// A start operation is all-or-nothing: every entry is parsed and
    /// validated before any live transition changes.
    pub fn handle_write(&mut self, bytes: &[u8]) -> Result<()> {
        for operation in parse_write_request(bytes)? {
            match operation {
                WriteOperation::Fetch { characteristic_id } => {
                    if !self.settings.service.contains(characteristic_id) {
                        return Err(AdaptiveLightError::unknown(format!(
                            "characteristic {characteristic_id} is not part of service {}",
                            self.settings.service.id
                        )));
                    }
                    self.pending = PendingResponse::Transition(characteristic_id);
                }
                WriteOperation::Start { entries } => {
                    self.start(&entries)?;
                    self.pending = PendingResponse::State;
                }
            }
        }
        Ok(())
    }

    fn start(&mut self, entries: &[Vec<u8>]) -> Result<()> {
        let before = self.live.num_transitions();
        let now = self.clock.now();
        let service_id = self.settings.service.id;

        let mut staging = self.staging_store();
        let mut staged: Vec<(SlotId, &[u8])> = Vec::with_capacity(entries.len());
        for entry in entries {
            let callbacks = &mut self.callbacks;
            let id = parse_transition(entry, &mut staging, now, service_id, None, |characteristic_id| {
                callbacks.value_request(characteristic_id)
            })?;
            staged.push((id, entry.as_slice()));
        }

        let mut plan = CapacityPlan::from_store(&self.live);
        for (id, _) in &staged {
            let transition = staging
                .get(*id)
                .ok_or_else(|| AdaptiveLightError::invalid("staged transition vanished"))?;
            let ctx = ValidationContext {
                service: Some(&self.settings.service),
                supported: &self.settings.supported,
                available_points: plan.available_for(transition.characteristic_id),
            };
            validate_transition(transition, &staging.points, &ctx)?;
            plan.reserve(transition.characteristic_id, transition.num_points())?;
        }

        for (id, entry) in staged {
            self.commit(&staging, id, Some(entry))?;
        }

        self.recompute()?;
        if self.live.num_transitions() != before {
            self.callbacks.transition_count_changed();
        }
        Ok(())
    }

    /// Replace the live transition of the staged characteristic.
    ///
    /// `entry` holds the wire bytes to persist; restores pass `None`.
    fn commit(&mut self, staging: &TransitionStore, id: SlotId, entry: Option<&[u8]>) -> Result<()> {
        let staged = staging
            .get(id)
            .ok_or_else(|| AdaptiveLightError::invalid("staged transition vanished"))?;
        let characteristic_id = staged.characteristic_id;

        if let Some(existing) = self.live.find(characteristic_id) {
            self.live.release(existing);
            log_debug!("Released previous transition for characteristic {characteristic_id}");
        }

        if staged.num_points() == 0 {
            if entry.is_some() {
                persistence::remove_record(
                    &mut self.storage,
                    self.settings.max_transitions,
                    characteristic_id,
                );
            }
            log_decorated!("Cleared transition for characteristic {}", characteristic_id);
            return Ok(());
        }

        let live_id = self.live.copy_from(staging, id)?;
        let transition = self
            .live
            .get_mut(live_id)
            .ok_or_else(|| AdaptiveLightError::invalid("committed transition vanished"))?;
        transition.last_notified_value = transition.current_value;
        transition.next_update_at = 0;
        transition.next_notification_at = 0;
        transition.active_point = 0;

        log_decorated!(
            "Started {} transition for characteristic {} ({} points, every {} ms)",
            transition.kind.map_or("empty", |k| k.name()),
            characteristic_id,
            transition.num_points(),
            transition.update_interval
        );

        if let Some(entry) = entry {
            let record = PersistedTransition {
                characteristic_id,
                request_time: transition.request_time,
                threshold: transition.threshold(),
                service_id: transition.service_id,
                entry: entry.to_vec(),
            };
            let now = self.clock.now();
            persistence::save_record(
                &mut self.storage,
                self.settings.max_transitions,
                &record,
                now,
            )?;
        }
        Ok(())
    }

    /// Produce the response for a control-point read.
    ///
    /// A pending fetch is answered once; afterwards reads return the
    /// transition state again.
    pub fn handle_read(&mut self) -> Result<Vec<u8>> {
        match std::mem::take(&mut self.pending) {
            PendingResponse::Transition(characteristic_id) => {
                if !self.settings.supports(characteristic_id) {
                    return Err(AdaptiveLightError::unknown(format!(
                        "characteristic {characteristic_id} does not support transitions"
                    )));
                }
                let found = self.live.find(characteristic_id);
                let points = found.map(|id| self.live.points_of(id)).unwrap_or_default();
                let transition = found.and_then(|id| self.live.get(id));
                encode_fetch_response(
                    transition.map(|t| (t, points.as_slice())),
                    self.settings.response_limit,
                )
            }
            PendingResponse::State => {
                encode_transition_state(&self.active_contexts(), self.settings.response_limit)
            }
        }
    }

    /// Encoded supported-transition table, limited to the service's members.
    pub fn supported_transition_configuration(&self) -> Result<Vec<u8>> {
        let entries: Vec<SupportedTransition> = self
            .settings
            .supported
            .iter()
            .filter(|s| self.settings.service.contains(s.characteristic_id))
            .copied()
            .collect();
        encode_supported(&entries, self.settings.response_limit)
    }

    /// Live transitions of this engine's service.
    pub fn active_contexts(&self) -> Vec<ActiveContext> {
        let now = self.clock.now();
        self.live
            .iter()
            .filter(|(_, t)| t.service_id == self.settings.service.id)
            .map(|(_, t)| ActiveContext {
                characteristic_id: t.characteristic_id,
                controller_context: t.controller_context.clone(),
                time_elapsed_ms: now.saturating_sub(t.request_time),
            })
            .collect()
    }

    pub fn transition_count(&self) -> usize {
        self.live.num_transitions()
    }

    pub fn has_transition(&self, characteristic_id: u64) -> bool {
        self.live.find(characteristic_id).is_some()
    }

    /// Current interpolated value of `characteristic_id`, if it has a
    /// transition.
    pub fn current_value(&self, characteristic_id: u64) -> Option<i32> {
        self.live
            .by_characteristic(characteristic_id)
            .map(|t| t.current_value)
    }

    /// Drop the transition of `characteristic_id` and its stored record.
    pub fn remove_transition(&mut self, characteristic_id: u64) -> Result<bool> {
        let Some(id) = self.live.find(characteristic_id) else {
            return Ok(false);
        };
        self.live.release(id);
        persistence::remove_record(
            &mut self.storage,
            self.settings.max_transitions,
            characteristic_id,
        );
        log_decorated!("Removed transition for characteristic {}", characteristic_id);
        self.callbacks.transition_count_changed();
        self.recompute()?;
        Ok(true)
    }

    /// Write the logical clock to storage and schedule the next write.
    pub fn persist_clock(&mut self) -> Result<()> {
        let now = self.clock.now();
        persistence::save_clock(&mut self.storage, now)?;
        self.next_clock_persist_at = now.saturating_add(self.settings.clock_persist_interval_ms);
        log_debug!("Persisted logical clock at {} ms", now);
        Ok(())
    }

    /// Logical time of the next periodic clock write, if the clock needs one.
    pub fn next_clock_persist_at(&self) -> Option<u64> {
        (!self.clock.persists()).then_some(self.next_clock_persist_at)
    }

    /// Host time of the earliest pending deadline: the transition timer or
    /// the periodic clock write.
    pub fn next_wakeup(&self) -> Option<u64> {
        let persist = self
            .next_clock_persist_at()
            .map(|logical| self.clock.to_host(logical));
        match (self.timer.deadline(), persist) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Service whatever is due at host time `host_now_ms`. Returns true when
    /// the transition timer fired.
    pub fn poll(&mut self, host_now_ms: u64) -> Result<bool> {
        let fired = self.timer.is_due(host_now_ms);
        if fired {
            self.handle_timer()?;
        }
        if let Some(at) = self.next_clock_persist_at()
            && self.clock.now() >= at
        {
            self.persist_clock()?;
        }
        Ok(fired)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Hand back the callbacks and storage, e.g. to simulate a restart.
    pub fn into_parts(self) -> (C, S) {
        (self.callbacks, self.storage)
    }
}
