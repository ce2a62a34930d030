//! Transition data model.
//!
//! A [`Transition`] drives one characteristic through an ordered list of
//! [`TransitionPoint`]s. Points live in a shared fixed-capacity pool and are
//! referenced by index, so a transition only holds [`PointId`]s.
//!
//! Submodules:
//! - `pool`: fixed-capacity slot allocators and the [`TransitionStore`]
//! - `timing`: point-time rebasing, linear rates and value interpolation
//! - `validation`: capability, capacity and ordering checks
//! - `codec`: TLV8 request parsing and response encoding
//! - `definition`: human-writable transition descriptions (TOML/JSON)

pub mod codec;
pub mod definition;
pub mod pool;
pub mod timing;
pub mod validation;

use serde::Serialize;

use crate::tlv::NarrowInt;

pub use pool::{PointId, Slab, SlotId, TransitionStore};

/// Bit flags advertised in the supported-transition table.
pub const TRANSITION_TYPE_LINEAR: u8 = 0x01;
pub const TRANSITION_TYPE_LINEAR_DERIVED: u8 = 0x02;

/// Gate a linear transition must cross before its values are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartCondition {
    None,
    Ascends,
    Descends,
    Unrecognized(u8),
}

impl StartCondition {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Ascends,
            2 => Self::Descends,
            other => Self::Unrecognized(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Ascends => 1,
            Self::Descends => 2,
            Self::Unrecognized(raw) => *raw,
        }
    }

    /// Whether `value` satisfies this gate against `threshold`.
    pub fn admits(&self, value: i32, threshold: i32) -> bool {
        match self {
            Self::None => true,
            Self::Ascends => value > threshold,
            Self::Descends => value < threshold,
            Self::Unrecognized(_) => false,
        }
    }
}

/// What happens once the last point has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndBehavior {
    /// Apply the final value, then remove the transition.
    Stop,
    /// Restart from the first point.
    Loop,
    Unrecognized(u8),
}

impl EndBehavior {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Stop,
            1 => Self::Loop,
            other => Self::Unrecognized(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Loop => 1,
            Self::Unrecognized(raw) => *raw,
        }
    }
}

/// Curve family and its transition-wide parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TransitionKind {
    /// Interpolates toward explicit targets.
    Linear {
        start_condition: StartCondition,
        threshold: i32,
    },
    /// Interpolates as `scale * source + offset` of another characteristic.
    LinearDerived {
        source_id: u64,
        lower: NarrowInt,
        upper: NarrowInt,
    },
}

impl TransitionKind {
    pub fn type_flag(&self) -> u8 {
        match self {
            Self::Linear { .. } => TRANSITION_TYPE_LINEAR,
            Self::LinearDerived { .. } => TRANSITION_TYPE_LINEAR_DERIVED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear { .. } => "linear",
            Self::LinearDerived { .. } => "linear_derived",
        }
    }
}

/// Per-point curve data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PointPayload {
    Linear { target: NarrowInt, rate: f32 },
    Derived { scale: f32, offset: f32 },
}

/// One breakpoint of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionPoint {
    /// Wait after the previous point completes, in ms
    pub start_delay: u64,
    /// Time to reach this point's value once started, in ms
    pub completion_duration: u64,
    /// Absolute logical start, recomputed on every rebase
    pub start_time: u64,
    /// Absolute logical end, recomputed on every rebase
    pub end_time: u64,
    pub execute_immediately: bool,
    pub payload: PointPayload,
}

impl TransitionPoint {
    pub fn linear(target: NarrowInt, completion_duration: u64, start_delay: u64) -> Self {
        Self {
            start_delay,
            completion_duration,
            start_time: 0,
            end_time: 0,
            execute_immediately: false,
            payload: PointPayload::Linear { target, rate: 0.0 },
        }
    }

    pub fn derived(scale: f32, offset: f32, completion_duration: u64, start_delay: u64) -> Self {
        Self {
            start_delay,
            completion_duration,
            start_time: 0,
            end_time: 0,
            execute_immediately: false,
            payload: PointPayload::Derived { scale, offset },
        }
    }

    pub fn target(&self) -> Option<i32> {
        match self.payload {
            PointPayload::Linear { target, .. } => Some(target.value()),
            PointPayload::Derived { .. } => None,
        }
    }
}

/// The interpolation program for one characteristic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub characteristic_id: u64,
    pub service_id: u64,
    /// `None` when the request carried no curve, which clears the characteristic
    pub kind: Option<TransitionKind>,
    pub points: Vec<PointId>,
    pub active_point: usize,
    pub current_value: i32,
    pub request_time: u64,
    pub end_behavior: EndBehavior,
    pub update_interval: u64,
    pub value_change_threshold: i32,
    pub time_interval_threshold: u64,
    pub last_notified_value: i32,
    pub next_notification_at: u64,
    pub next_update_at: u64,
    pub controller_context: Vec<u8>,
}

impl Transition {
    pub fn new(characteristic_id: u64, service_id: u64, request_time: u64) -> Self {
        Self {
            characteristic_id,
            service_id,
            kind: None,
            points: Vec::new(),
            active_point: 0,
            current_value: 0,
            request_time,
            end_behavior: EndBehavior::Stop,
            update_interval: crate::common::constants::DEFAULT_UPDATE_INTERVAL_MS,
            value_change_threshold: 0,
            time_interval_threshold: crate::common::constants::DEFAULT_UPDATE_INTERVAL_MS,
            last_notified_value: 0,
            next_notification_at: 0,
            next_update_at: 0,
            controller_context: Vec::new(),
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.kind, Some(TransitionKind::Linear { .. }))
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, Some(TransitionKind::LinearDerived { .. }))
    }

    /// Source characteristic of a derived transition.
    pub fn source_id(&self) -> Option<u64> {
        match self.kind {
            Some(TransitionKind::LinearDerived { source_id, .. }) => Some(source_id),
            _ => None,
        }
    }

    /// Start-condition threshold, persisted for linear transitions only.
    pub fn threshold(&self) -> Option<i32> {
        match self.kind {
            Some(TransitionKind::Linear { threshold, .. }) => Some(threshold),
            _ => None,
        }
    }
}

/// One row of the supported-transition capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct SupportedTransition {
    pub characteristic_id: u64,
    /// Bitwise OR of `TRANSITION_TYPE_*`
    pub types: u8,
}

impl SupportedTransition {
    pub fn new(characteristic_id: u64, types: u8) -> Self {
        Self {
            characteristic_id,
            types,
        }
    }

    pub fn permits(&self, kind: &TransitionKind) -> bool {
        self.types & kind.type_flag() != 0
    }
}

/// Active transition as reported in the transition state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveContext {
    pub characteristic_id: u64,
    pub controller_context: Vec<u8>,
    pub time_elapsed_ms: u64,
}
