//! Point scheduling and value interpolation.
//!
//! All times are logical milliseconds. Linear arithmetic is done in `f32`
//! with truncation toward zero, derived arithmetic rounds half away from zero.

use super::pool::{point_at, point_at_mut};
use super::{PointPayload, Slab, StartCondition, Transition, TransitionKind, TransitionPoint};
use crate::error::{AdaptiveLightError, Result};

/// Recompute absolute start/end times of every point.
///
/// Point 0 starts after the previous cycle's final end time when one exists
/// (a looping transition), otherwise after `base`: the request time on
/// restore, the current time for a fresh request.
pub fn update_point_times(
    transition: &Transition,
    points: &mut Slab<TransitionPoint>,
    base: u64,
) -> Result<()> {
    let count = transition.num_points();
    if count == 0 {
        return Ok(());
    }

    let last_end = point_at(transition, points, count - 1)?.end_time;
    let mut prev_end = if last_end != 0 { last_end } else { base };

    for i in 0..count {
        let point = point_at_mut(transition, points, i)?;

        // A zero-length segment after the first would never let the clock pass it
        if i > 0 && point.completion_duration == 0 {
            return Err(AdaptiveLightError::invalid(format!(
                "completion duration for point #{i} must be non-zero"
            )));
        }

        point.execute_immediately =
            i == 0 && count > 1 && point.start_delay == 0 && point.completion_duration == 0;
        point.start_time = prev_end.saturating_add(point.start_delay);
        point.end_time = point.start_time.saturating_add(point.completion_duration);
        prev_end = point.end_time;
    }
    Ok(())
}

/// Precompute per-point linear rates.
///
/// Point 0 ramps from the transition's current value, every later point from
/// its predecessor's target.
pub fn update_linear_rates(transition: &Transition, points: &mut Slab<TransitionPoint>) -> Result<()> {
    if !transition.is_linear() {
        return Ok(());
    }

    let mut prev_target = transition.current_value;
    for i in 0..transition.num_points() {
        let point = point_at_mut(transition, points, i)?;
        let duration = point.completion_duration;
        if let PointPayload::Linear { target, rate } = &mut point.payload {
            *rate = linear_rate(prev_target, target.value(), duration);
            prev_target = target.value();
        }
    }
    Ok(())
}

/// `(target - previous) / duration`, or 0 for an instantaneous point.
pub fn linear_rate(previous: i32, target: i32, duration_ms: u64) -> f32 {
    if duration_ms == 0 {
        return 0.0;
    }
    (target as i64 - previous as i64) as f32 / duration_ms as f32
}

/// Value of a linear segment ending at `target` at `end_time`.
pub fn linear_value(target: i32, rate: f32, end_time: u64, now: u64) -> i32 {
    let remaining = end_time.saturating_sub(now);
    (target as f32 - remaining as f32 * rate) as i32
}

/// Value of a derived point, blending from `previous` (scale, offset) over
/// the segment when one is given.
pub fn derived_value(
    source: i32,
    current: (f32, f32),
    previous: Option<(f32, f32)>,
    duration_ms: u64,
    elapsed_ms: u64,
) -> i32 {
    let b = source as f32;
    let (s2, c2) = current;
    match previous {
        Some((s1, c1)) if duration_ms != 0 => {
            let m = (s2 * b + c2 - s1 * b - c1) / duration_ms as f32;
            (m * elapsed_ms as f32 + (s1 * b + c1)).round() as i32
        }
        _ => (b * s2 + c2).round() as i32,
    }
}

/// Clamp without panicking on an inverted range.
pub fn clamp_source(value: i32, lower: i32, upper: i32) -> i32 {
    if value < lower {
        lower
    } else if value > upper {
        upper
    } else {
        value
    }
}

/// Recompute `transition.current_value` from its active point at `now`.
///
/// `source_value` is the raw value of the tracked characteristic for derived
/// transitions and ignored for linear ones.
pub fn compute_value(
    transition: &mut Transition,
    points: &mut Slab<TransitionPoint>,
    now: u64,
    source_value: i32,
) -> Result<()> {
    let active = transition.active_point;
    let previous = if active > 0 {
        Some(*point_at(transition, points, active - 1)?)
    } else {
        None
    };

    let point = point_at_mut(transition, points, active)?;
    let now = now.min(point.end_time);
    if point.execute_immediately {
        point.start_time = now;
        point.end_time = now;
    }

    match (&mut transition.kind, point.payload) {
        (
            Some(TransitionKind::Linear {
                start_condition,
                threshold,
            }),
            PointPayload::Linear { target, rate },
        ) => {
            let value = linear_value(target.value(), rate, point.end_time, now);
            if start_condition.admits(value, *threshold) {
                transition.current_value = value;
                *start_condition = StartCondition::None;
            }
        }
        (
            Some(TransitionKind::LinearDerived { lower, upper, .. }),
            PointPayload::Derived { scale, offset },
        ) => {
            let source = clamp_source(source_value, lower.value(), upper.value());
            let previous = previous.and_then(|p| match p.payload {
                PointPayload::Derived { scale, offset } => Some((scale, offset)),
                PointPayload::Linear { .. } => None,
            });
            transition.current_value = derived_value(
                source,
                (scale, offset),
                previous,
                point.completion_duration,
                now.saturating_sub(point.start_time),
            );
        }
        _ => {
            return Err(AdaptiveLightError::invalid(format!(
                "point #{active} of transition {} does not match its curve type",
                transition.characteristic_id
            )));
        }
    }

    point.execute_immediately = false;
    Ok(())
}

/// Decide whether the freshly computed value should notify controllers,
/// updating the notification bookkeeping when it does.
pub fn take_notification(transition: &mut Transition, now: u64) -> bool {
    let delta = (transition.current_value as i64 - transition.last_notified_value as i64).abs();
    if delta >= transition.value_change_threshold as i64 && transition.next_notification_at <= now
    {
        transition.next_notification_at = now.saturating_add(transition.time_interval_threshold);
        transition.last_notified_value = transition.current_value;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionStore;
    use crate::tlv::NarrowInt;

    fn linear_transition(
        store: &mut TransitionStore,
        current: i32,
        points: &[(i32, u64, u64)],
    ) -> crate::transition::SlotId {
        let mut t = Transition::new(0xA0, 0x10, 0);
        t.current_value = current;
        t.kind = Some(TransitionKind::Linear {
            start_condition: StartCondition::None,
            threshold: current,
        });
        let id = store.allocate(t).unwrap();
        for &(target, duration, delay) in points {
            store
                .push_point(id, TransitionPoint::linear(NarrowInt::fit(target), duration, delay))
                .unwrap();
        }
        id
    }

    #[test]
    fn test_point_times_chain_from_base() {
        let mut store = TransitionStore::new(1, 4);
        let id = linear_transition(&mut store, 0, &[(10, 1_000, 500), (20, 2_000, 250)]);
        let (t, points) = store.split_mut(id).unwrap();
        update_point_times(t, points, 10_000).unwrap();

        let pts = store.points_of(id);
        assert_eq!((pts[0].start_time, pts[0].end_time), (10_500, 11_500));
        assert_eq!((pts[1].start_time, pts[1].end_time), (11_750, 13_750));
        assert!(!pts[0].execute_immediately);
    }

    #[test]
    fn test_loop_rebases_from_previous_end() {
        let mut store = TransitionStore::new(1, 4);
        let id = linear_transition(&mut store, 0, &[(10, 1_000, 0), (20, 2_000, 0)]);
        let (t, points) = store.split_mut(id).unwrap();
        update_point_times(t, points, 0).unwrap();
        // The base is ignored once the last point carries an end time
        update_point_times(t, points, 99_999).unwrap();

        let pts = store.points_of(id);
        assert_eq!((pts[0].start_time, pts[0].end_time), (3_000, 4_000));
        assert_eq!((pts[1].start_time, pts[1].end_time), (4_000, 6_000));
    }

    #[test]
    fn test_execute_immediately_flag() {
        let mut store = TransitionStore::new(2, 4);
        let id = linear_transition(&mut store, 0, &[(10, 0, 0), (20, 60_000, 0)]);
        let (t, points) = store.split_mut(id).unwrap();
        update_point_times(t, points, 5_000).unwrap();
        let pts = store.points_of(id);
        assert!(pts[0].execute_immediately);
        assert_eq!((pts[0].start_time, pts[0].end_time), (5_000, 5_000));
        assert_eq!((pts[1].start_time, pts[1].end_time), (5_000, 65_000));

        // A lone zero-length point is not flagged
        let single = linear_transition(&mut store, 0, &[(10, 0, 0)]);
        let (t, points) = store.split_mut(single).unwrap();
        update_point_times(t, points, 5_000).unwrap();
        assert!(!store.points_of(single)[0].execute_immediately);
    }

    #[test]
    fn test_zero_duration_after_first_point_is_rejected() {
        let mut store = TransitionStore::new(1, 4);
        let id = linear_transition(&mut store, 0, &[(10, 1_000, 0), (20, 0, 0)]);
        let (t, points) = store.split_mut(id).unwrap();
        let err = update_point_times(t, points, 0).unwrap_err();
        assert!(matches!(err, AdaptiveLightError::InvalidData(_)));
    }

    #[test]
    fn test_two_point_linear_values() {
        // Current value 60, ramp to 50 over 1s, then to 90 over 4s
        let mut store = TransitionStore::new(1, 4);
        let id = linear_transition(&mut store, 60, &[(50, 1_000, 0), (90, 4_000, 0)]);
        let (t, points) = store.split_mut(id).unwrap();
        update_point_times(t, points, 0).unwrap();
        update_linear_rates(t, points).unwrap();

        compute_value(t, points, 0, 0).unwrap();
        assert_eq!(t.current_value, 60);
        compute_value(t, points, 1_000, 0).unwrap();
        assert_eq!(t.current_value, 50);

        t.active_point = 1;
        let mut seen = Vec::new();
        for now in [2_000, 3_000, 4_000, 5_000, 7_000] {
            compute_value(t, points, now, 0).unwrap();
            seen.push(t.current_value);
        }
        // Clamped at the segment end
        assert_eq!(seen, vec![60, 70, 80, 90, 90]);
    }

    #[test]
    fn test_start_condition_holds_value_until_crossed() {
        let mut store = TransitionStore::new(1, 4);
        let id = linear_transition(&mut store, 0, &[(100, 1_000, 0)]);
        let (t, points) = store.split_mut(id).unwrap();
        t.kind = Some(TransitionKind::Linear {
            start_condition: StartCondition::Ascends,
            threshold: 40,
        });
        t.current_value = 40;
        update_point_times(t, points, 0).unwrap();
        update_linear_rates(t, points).unwrap();

        compute_value(t, points, 0, 0).unwrap();
        // 40 is not above the threshold yet
        assert_eq!(t.current_value, 40);

        compute_value(t, points, 500, 0).unwrap();
        assert_eq!(t.current_value, 70);
        assert!(matches!(
            t.kind,
            Some(TransitionKind::Linear {
                start_condition: StartCondition::None,
                ..
            })
        ));
    }

    #[test]
    fn test_derived_value_blends_between_points() {
        assert_eq!(derived_value(50, (2.0, 10.0), None, 0, 0), 110);
        // Halfway from (1, 0) to (3, 0) at source 10: 10 -> 30
        assert_eq!(derived_value(10, (3.0, 0.0), Some((1.0, 0.0)), 1_000, 500), 20);
        // Zero duration falls back to the plain mapping
        assert_eq!(derived_value(10, (3.0, 0.0), Some((1.0, 0.0)), 0, 0), 30);
        assert_eq!(derived_value(1, (0.5, 0.0), None, 0, 0), 1);
        assert_eq!(derived_value(-1, (0.5, 0.0), None, 0, 0), -1);
    }

    #[test]
    fn test_clamp_source_tolerates_inverted_range() {
        assert_eq!(clamp_source(150, 0, 100), 100);
        assert_eq!(clamp_source(-5, 0, 100), 0);
        assert_eq!(clamp_source(5, 10, 0), 10);
    }

    #[test]
    fn test_notification_thresholds() {
        let mut t = Transition::new(0xA0, 0x10, 0);
        t.value_change_threshold = 5;
        t.time_interval_threshold = 1_000;
        t.last_notified_value = 50;

        t.current_value = 53;
        assert!(!take_notification(&mut t, 0));

        t.current_value = 56;
        assert!(take_notification(&mut t, 0));
        assert_eq!((t.last_notified_value, t.next_notification_at), (56, 1_000));

        t.current_value = 80;
        assert!(!take_notification(&mut t, 999));
        assert!(take_notification(&mut t, 1_000));
    }
}
