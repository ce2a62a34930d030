//! Point advancement, value updates and timer arming.

use super::AdaptiveLight;
use crate::callbacks::TransitionCallbacks;
use crate::error::{AdaptiveLightError, Result};
use crate::persistence::{self, KeyValueStore};
use crate::timer::WakeupTimer;
use crate::transition::pool::point_at;
use crate::transition::timing::{compute_value, take_notification, update_point_times};
use crate::transition::{EndBehavior, SlotId};

enum Expiry {
    Removed,
    Restarted,
}

impl<C, S, T> AdaptiveLight<C, S, T>
where
    C: TransitionCallbacks,
    S: KeyValueStore,
    T: WakeupTimer,
{
    /// The wake-up timer fired.
    pub fn handle_timer(&mut self) -> Result<()> {
        self.timer.cancel();
        self.recompute()
    }

    /// Bring every live transition up to the current logical time and arm
    /// the timer for the earliest next update.
    ///
    /// A transition that cannot be evaluated is dropped; the others keep
    /// running. Only storage failures abort.
    ///
    /// Running it twice at the same instant changes nothing the second time.
    pub fn recompute(&mut self) -> Result<()> {
        self.timer.cancel();
        if self.live.num_transitions() == 0 {
            return Ok(());
        }

        let now = self.clock.now();
        for id in self.live.transitions.ids() {
            if let Err(e) = self.advance(id, now) {
                self.discard(id, e)?;
            }
        }

        let mut next_update = u64::MAX;
        for id in self.live.transitions.ids() {
            match self.update(id, now) {
                Ok(Some(at)) => next_update = next_update.min(at),
                Ok(None) => {}
                Err(e) => self.discard(id, e)?,
            }
        }

        if next_update == u64::MAX {
            return Ok(());
        }
        if next_update < now {
            return Err(AdaptiveLightError::invalid(format!(
                "next update at {next_update} ms is already in the past ({now} ms)"
            )));
        }
        let host_deadline = self.clock.to_host(next_update);
        self.timer.schedule(host_deadline);
        log_debug!(
            "Next transition update at {} ms (host {} ms)",
            next_update,
            host_deadline
        );
        Ok(())
    }

    /// Push a new value for `id` if one is due. Returns its next update time.
    fn update(&mut self, id: SlotId, now: u64) -> Result<Option<u64>> {
        let source = self.source_value_for(id);
        let Some((transition, points)) = self.live.split_mut(id) else {
            return Ok(None);
        };
        let point = *point_at(transition, points, transition.active_point)?;

        let due = transition.next_update_at <= now
            && point.start_time <= now
            && now <= point.end_time;
        if point.execute_immediately || due {
            transition.next_update_at = now.saturating_add(transition.update_interval);
            compute_value(transition, points, now, source)?;
            let notify = take_notification(transition, now);
            self.callbacks
                .value_update(transition.characteristic_id, transition.current_value, notify);
        } else if now < point.start_time {
            transition.next_update_at = point.start_time;
        } else if now > point.end_time {
            return Err(AdaptiveLightError::invalid(format!(
                "transition {} is past the end of its active point",
                transition.characteristic_id
            )));
        }
        Ok(Some(transition.next_update_at))
    }

    /// Drop a transition that failed to evaluate.
    fn discard(&mut self, id: SlotId, err: AdaptiveLightError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        let Some(transition) = self.live.release(id) else {
            return Ok(());
        };
        let characteristic_id = transition.characteristic_id;
        log_error!(
            "Dropping transition for characteristic {}: {}",
            characteristic_id,
            err
        );
        persistence::remove_record(
            &mut self.storage,
            self.settings.max_transitions,
            characteristic_id,
        );
        self.callbacks.transition_count_changed();
        Ok(())
    }

    /// Move the active point of `id` forward until it covers `now`.
    fn advance(&mut self, id: SlotId, now: u64) -> Result<()> {
        loop {
            let Some(transition) = self.live.get(id) else {
                return Ok(());
            };
            let count = transition.num_points();
            let active = transition.active_point;
            let point = point_at(transition, &self.live.points, active)?;
            if now <= point.end_time {
                return Ok(());
            }
            // An instantaneous first point holds until the following point ends
            if point.execute_immediately
                && count > 1
                && point_at(transition, &self.live.points, active + 1)?.end_time > now
            {
                return Ok(());
            }

            let next = active + 1;
            if let Some(transition) = self.live.get_mut(id) {
                transition.active_point = next;
            }
            if next >= count {
                match self.expire(id, now)? {
                    Expiry::Removed => return Ok(()),
                    Expiry::Restarted => continue,
                }
            }
        }
    }

    /// Handle a transition that ran past its final point.
    fn expire(&mut self, id: SlotId, now: u64) -> Result<Expiry> {
        let source = self.source_value_for(id);
        let (transition, points) = self
            .live
            .split_mut(id)
            .ok_or_else(|| AdaptiveLightError::invalid("expired transition vanished"))?;

        match transition.end_behavior {
            EndBehavior::Loop => {
                let count = transition.num_points();
                let last_end = point_at(transition, points, count - 1)?.end_time;
                transition.active_point = 0;
                update_point_times(transition, points, now)?;
                let new_end = point_at(transition, points, count - 1)?.end_time;
                if new_end <= last_end {
                    return Err(AdaptiveLightError::invalid(format!(
                        "looping transition {} does not advance",
                        transition.characteristic_id
                    )));
                }
                log_debug!(
                    "Transition for characteristic {} restarted, cycle ends at {} ms",
                    transition.characteristic_id,
                    new_end
                );
                Ok(Expiry::Restarted)
            }
            _ => {
                transition.active_point -= 1;
                compute_value(transition, points, now, source)?;
                let characteristic_id = transition.characteristic_id;
                let value = transition.current_value;
                self.callbacks.value_update(characteristic_id, value, true);

                self.live.release(id);
                persistence::remove_record(
                    &mut self.storage,
                    self.settings.max_transitions,
                    characteristic_id,
                );
                log_decorated!(
                    "Transition for characteristic {} completed at {}",
                    characteristic_id,
                    value
                );
                self.callbacks.transition_count_changed();
                Ok(Expiry::Removed)
            }
        }
    }

    /// Source value for a derived transition: a live transition on the
    /// source characteristic wins over the host's value. Zero for linear
    /// transitions.
    fn source_value_for(&mut self, id: SlotId) -> i32 {
        let Some(source_id) = self.live.get(id).and_then(|t| t.source_id()) else {
            return 0;
        };
        self.source_value(source_id)
    }

    fn source_value(&mut self, source_id: u64) -> i32 {
        match self.live.by_characteristic(source_id) {
            Some(source) => source.current_value,
            None => self.callbacks.value_request(source_id),
        }
    }

    /// A characteristic that derived transitions follow changed value.
    ///
    /// Dependent transitions are recomputed and pushed with notification,
    /// without touching their update schedule.
    pub fn handle_source_value_change(&mut self, source_id: u64) -> Result<()> {
        let now = self.clock.now();
        let dependents: Vec<SlotId> = self
            .live
            .iter()
            .filter(|(_, t)| t.source_id() == Some(source_id))
            .map(|(id, _)| id)
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }

        let source = self.source_value(source_id);
        for id in dependents {
            if let Err(e) = self.refresh_dependent(id, now, source) {
                self.discard(id, e)?;
            }
        }
        Ok(())
    }

    fn refresh_dependent(&mut self, id: SlotId, now: u64, source: i32) -> Result<()> {
        let Some((transition, points)) = self.live.split_mut(id) else {
            return Ok(());
        };
        if transition.active_point == 0 && now < point_at(transition, points, 0)?.start_time {
            return Ok(());
        }
        compute_value(transition, points, now, source)?;
        self.callbacks
            .value_update(transition.characteristic_id, transition.current_value, true);
        Ok(())
    }
}
