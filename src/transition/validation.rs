//! Checks a staged transition before it may replace live state.
//!
//! Point ordering uses one non-strict convention: for every point after the
//! first, `start >= previous start`, `start >= previous end`, `end >= start`
//! and `end >= previous end`. Equal boundaries are accepted.

use std::collections::BTreeMap;

use super::pool::point_at;
use super::{
    EndBehavior, Slab, StartCondition, SupportedTransition, Transition, TransitionKind,
    TransitionPoint, TransitionStore,
};
use crate::common::constants::MIN_TARGET_COMPLETION_DURATION_MS;
use crate::error::{AdaptiveLightError, Result};
use crate::service::ServiceDescriptor;

/// Inputs the validator checks a transition against.
pub struct ValidationContext<'a> {
    /// Target service, or `None` when restoring from storage
    pub service: Option<&'a ServiceDescriptor>,
    pub supported: &'a [SupportedTransition],
    /// Points the transition may use: free pool slots plus those held by the
    /// transition it would replace
    pub available_points: usize,
}

pub fn validate_transition(
    transition: &Transition,
    points: &Slab<TransitionPoint>,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    let id = transition.characteristic_id;

    if let Some(service) = ctx.service
        && !service.contains(id)
    {
        return Err(AdaptiveLightError::invalid(format!(
            "characteristic {id} is not part of service {}",
            service.id
        )));
    }

    let supported = ctx
        .supported
        .iter()
        .find(|s| s.characteristic_id == id)
        .ok_or_else(|| {
            AdaptiveLightError::invalid(format!("characteristic {id} does not support transitions"))
        })?;

    if let Some(kind) = &transition.kind
        && !supported.permits(kind)
    {
        return Err(AdaptiveLightError::invalid(format!(
            "characteristic {id} does not support {} transitions",
            kind.name()
        )));
    }

    match (&transition.kind, ctx.service) {
        (Some(TransitionKind::Linear { .. }), Some(service)) => {
            let descriptor = service.characteristic(id).ok_or_else(|| {
                AdaptiveLightError::invalid(format!("characteristic {id} has no declared range"))
            })?;
            for i in 0..transition.num_points() {
                let point = point_at(transition, points, i)?;
                if let Some(target) = point.target()
                    && !descriptor.contains(target)
                {
                    return Err(AdaptiveLightError::invalid(format!(
                        "target {target} of point #{i} is outside {}..={}",
                        descriptor.min, descriptor.max
                    )));
                }
            }
        }
        (
            Some(TransitionKind::LinearDerived {
                source_id,
                lower,
                upper,
            }),
            Some(service),
        ) => {
            if !service.range_is_valid(*source_id, lower.value(), upper.value()) {
                return Err(AdaptiveLightError::invalid(format!(
                    "source range {}..={} is not within characteristic {source_id}",
                    lower.value(),
                    upper.value()
                )));
            }
        }
        _ => {}
    }

    if let Some(TransitionKind::Linear {
        start_condition: StartCondition::Unrecognized(raw),
        ..
    }) = transition.kind
    {
        return Err(AdaptiveLightError::invalid(format!(
            "invalid start condition {raw}"
        )));
    }

    if let EndBehavior::Unrecognized(raw) = transition.end_behavior {
        return Err(AdaptiveLightError::invalid(format!(
            "invalid end behavior {raw}"
        )));
    }

    if matches!(transition.end_behavior, EndBehavior::Loop) {
        let mut cycle = 0u64;
        for i in 0..transition.num_points() {
            let point = point_at(transition, points, i)?;
            cycle = cycle
                .saturating_add(point.start_delay)
                .saturating_add(point.completion_duration);
        }
        if cycle == 0 {
            return Err(AdaptiveLightError::invalid(format!(
                "looping transition for characteristic {id} has a zero-length cycle"
            )));
        }
    }

    if transition.num_points() > ctx.available_points {
        return Err(AdaptiveLightError::out_of_resources(format!(
            "insufficient storage for transition points: available = {} required = {}",
            ctx.available_points,
            transition.num_points()
        )));
    }

    validate_point_order(transition, points)
}

fn validate_point_order(transition: &Transition, points: &Slab<TransitionPoint>) -> Result<()> {
    let mut prev: Option<(u64, u64)> = None;

    for i in 0..transition.num_points() {
        let point = point_at(transition, points, i)?;
        let (start, end) = (point.start_time, point.end_time);

        if end < start {
            return Err(AdaptiveLightError::invalid(format!(
                "point #{i} ends before it starts"
            )));
        }
        if let Some((prev_start, prev_end)) = prev {
            if start < prev_start {
                return Err(AdaptiveLightError::invalid(format!(
                    "point #{i} starts before the previous point starts"
                )));
            }
            if start < prev_end {
                return Err(AdaptiveLightError::invalid(format!(
                    "point #{i} starts before the previous point ends"
                )));
            }
            if end < prev_end {
                return Err(AdaptiveLightError::invalid(format!(
                    "point #{i} ends before the previous point ends"
                )));
            }
        }
        prev = Some((start, end));

        let duration = point.completion_duration;
        if duration < MIN_TARGET_COMPLETION_DURATION_MS && !(i == 0 && duration == 0) {
            return Err(AdaptiveLightError::invalid(format!(
                "completion duration of point #{i} is {duration} ms, minimum is \
                 {MIN_TARGET_COMPLETION_DURATION_MS} ms"
            )));
        }
    }
    Ok(())
}

/// Projected pool usage while a multi-transition request is validated.
///
/// Each accepted transition replaces whatever the same characteristic held
/// before, so the plan tracks point counts per characteristic.
#[derive(Debug, Clone)]
pub struct CapacityPlan {
    max_points: usize,
    max_transitions: usize,
    planned: BTreeMap<u64, usize>,
}

impl CapacityPlan {
    pub fn from_store(store: &TransitionStore) -> Self {
        let planned = store
            .iter()
            .map(|(_, t)| (t.characteristic_id, t.num_points()))
            .collect();
        Self {
            max_points: store.points.capacity(),
            max_transitions: store.transitions.capacity(),
            planned,
        }
    }

    fn used_points(&self) -> usize {
        self.planned.values().sum()
    }

    /// Points a transition for `characteristic_id` could claim.
    pub fn available_for(&self, characteristic_id: u64) -> usize {
        let held = self.planned.get(&characteristic_id).copied().unwrap_or(0);
        self.max_points.saturating_sub(self.used_points()) + held
    }

    /// Record that `characteristic_id` will hold `points` points.
    pub fn reserve(&mut self, characteristic_id: u64, points: usize) -> Result<()> {
        if points == 0 {
            self.planned.remove(&characteristic_id);
            return Ok(());
        }
        if points > self.available_for(characteristic_id) {
            return Err(AdaptiveLightError::out_of_resources(format!(
                "insufficient storage for {points} transition points"
            )));
        }
        let is_new = !self.planned.contains_key(&characteristic_id);
        if is_new && self.planned.len() >= self.max_transitions {
            return Err(AdaptiveLightError::out_of_resources(format!(
                "no space left for a transition on characteristic {characteristic_id}"
            )));
        }
        self.planned.insert(characteristic_id, points);
        Ok(())
    }
}
