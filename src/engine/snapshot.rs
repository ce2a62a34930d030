//! Read-only views of engine state for `inspect` and debug logging.

use serde::Serialize;

use super::AdaptiveLight;
use crate::callbacks::TransitionCallbacks;
use crate::persistence::KeyValueStore;
use crate::timer::WakeupTimer;
use crate::transition::{EndBehavior, TransitionPoint};

#[derive(Debug, Clone, Serialize)]
pub struct TransitionSnapshot {
    pub characteristic_id: u64,
    pub service_id: u64,
    pub kind: &'static str,
    pub source_id: Option<u64>,
    pub current_value: i32,
    pub active_point: usize,
    pub end_behavior: EndBehavior,
    pub request_time: u64,
    pub update_interval: u64,
    pub next_update_at: u64,
    pub last_notified_value: i32,
    pub controller_context: String,
    pub points: Vec<TransitionPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub logical_now: u64,
    pub clock_offset_ms: i64,
    pub timer_deadline: Option<u64>,
    pub points_used: usize,
    pub points_capacity: usize,
    pub transitions: Vec<TransitionSnapshot>,
}

impl<C, S, T> AdaptiveLight<C, S, T>
where
    C: TransitionCallbacks,
    S: KeyValueStore,
    T: WakeupTimer,
{
    pub fn snapshot(&self) -> EngineSnapshot {
        let transitions = self
            .live
            .iter()
            .map(|(id, t)| TransitionSnapshot {
                characteristic_id: t.characteristic_id,
                service_id: t.service_id,
                kind: t.kind.map_or("empty", |k| k.name()),
                source_id: t.source_id(),
                current_value: t.current_value,
                active_point: t.active_point,
                end_behavior: t.end_behavior,
                request_time: t.request_time,
                update_interval: t.update_interval,
                next_update_at: t.next_update_at,
                last_notified_value: t.last_notified_value,
                controller_context: String::from_utf8_lossy(&t.controller_context).into_owned(),
                points: self.live.points_of(id),
            })
            .collect();

        EngineSnapshot {
            logical_now: self.clock.now(),
            clock_offset_ms: self.clock.offset_ms(),
            timer_deadline: self.timer.deadline(),
            points_used: self.live.num_points(),
            points_capacity: self.live.points.capacity(),
            transitions,
        }
    }

    /// Dump every live transition through the logger.
    pub fn log_transitions(&self) {
        let snapshot = self.snapshot();
        log_block_start!(
            "{} transition(s), {}/{} points in use",
            snapshot.transitions.len(),
            snapshot.points_used,
            snapshot.points_capacity
        );
        for t in &snapshot.transitions {
            log_decorated!(
                "Characteristic {}: {} {:?}, value {}, point {}/{}",
                t.characteristic_id,
                t.kind,
                t.end_behavior,
                t.current_value,
                t.active_point + 1,
                t.points.len()
            );
            if let Some(source) = t.source_id {
                log_indented!("Follows characteristic {}", source);
            }
            for (i, point) in t.points.iter().enumerate() {
                log_indented!(
                    "#{} {} .. {} ms{}",
                    i,
                    point.start_time,
                    point.end_time,
                    point
                        .target()
                        .map(|target| format!(" -> {target}"))
                        .unwrap_or_default()
                );
            }
        }
    }
}
