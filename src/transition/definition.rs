//! Human-writable transition descriptions.
//!
//! The CLI accepts start requests as TOML or JSON and turns them into the
//! same TLV8 bytes a controller would write:
//!
//! ```toml
//! [[transition]]
//! characteristic = 0x13
//! context = "evening"
//! end = "loop"
//! update_interval_ms = 1000
//!
//! [transition.curve]
//! type = "linear"
//! points = [
//!     { target = 50, duration_ms = 1000 },
//!     { target = 90, duration_ms = 4000 },
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::codec::{encode_start_request, encode_transition_entry};
use super::{EndBehavior, StartCondition, Transition, TransitionKind, TransitionPoint};
use crate::common::constants::{
    DEFAULT_SERVICE_ID, MAX_TRANSITION_TLV_BYTES, MAXIMUM_TRANSITIONS,
};
use crate::tlv::NarrowInt;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndMode {
    #[default]
    Stop,
    Loop,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StartWhen {
    #[default]
    Immediately,
    Ascends,
    Descends,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LinearPointDefinition {
    pub target: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DerivedPointDefinition {
    pub scale: f32,
    #[serde(default)]
    pub offset: f32,
    pub duration_ms: u64,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurveDefinition {
    Linear {
        points: Vec<LinearPointDefinition>,
        #[serde(default)]
        start: StartWhen,
    },
    Derived {
        source: u64,
        lower: i32,
        upper: i32,
        points: Vec<DerivedPointDefinition>,
    },
}

/// One transition of a start request. A definition without a curve clears
/// the characteristic's transition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransitionDefinition {
    pub characteristic: u64,
    pub context: Option<String>,
    pub end: Option<EndMode>,
    pub update_interval_ms: Option<u64>,
    pub value_threshold: Option<i32>,
    pub time_threshold_ms: Option<u64>,
    pub curve: Option<CurveDefinition>,
}

impl TransitionDefinition {
    /// Encode as a single start-request entry.
    pub fn to_entry(&self) -> Result<Vec<u8>> {
        let mut transition = Transition::new(self.characteristic, DEFAULT_SERVICE_ID, 0);
        transition.controller_context = self
            .context
            .as_deref()
            .map(|c| c.as_bytes().to_vec())
            .unwrap_or_default();
        transition.end_behavior = match self.end.unwrap_or_default() {
            EndMode::Stop => EndBehavior::Stop,
            EndMode::Loop => EndBehavior::Loop,
        };
        if let Some(interval) = self.update_interval_ms {
            transition.update_interval = interval;
        }
        transition.value_change_threshold = self.value_threshold.unwrap_or(0);
        transition.time_interval_threshold =
            self.time_threshold_ms.unwrap_or(transition.update_interval);

        let points = match &self.curve {
            Some(CurveDefinition::Linear { points, start }) => {
                transition.kind = Some(TransitionKind::Linear {
                    start_condition: match start {
                        StartWhen::Immediately => StartCondition::None,
                        StartWhen::Ascends => StartCondition::Ascends,
                        StartWhen::Descends => StartCondition::Descends,
                    },
                    threshold: 0,
                });
                points
                    .iter()
                    .map(|p| TransitionPoint::linear(NarrowInt::fit(p.target), p.duration_ms, p.delay_ms))
                    .collect()
            }
            Some(CurveDefinition::Derived {
                source,
                lower,
                upper,
                points,
            }) => {
                transition.kind = Some(TransitionKind::LinearDerived {
                    source_id: *source,
                    lower: NarrowInt::fit(*lower),
                    upper: NarrowInt::fit(*upper),
                });
                points
                    .iter()
                    .map(|p| TransitionPoint::derived(p.scale, p.offset, p.duration_ms, p.delay_ms))
                    .collect()
            }
            None => Vec::new(),
        };

        encode_transition_entry(&transition, &points).with_context(|| {
            format!(
                "Failed to encode transition for characteristic {}",
                self.characteristic
            )
        })
    }
}

/// A batch of transitions applied all-or-nothing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StartRequest {
    #[serde(rename = "transition", default)]
    pub transitions: Vec<TransitionDefinition>,
}

impl StartRequest {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse transition definition as TOML")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse transition definition as JSON")
    }

    /// Load a definition file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transition file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let request = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        request.with_context(|| format!("Invalid transition file {}", path.display()))
    }

    /// Fill in `update_interval_ms` for definitions that leave it out.
    pub fn with_default_update_interval(mut self, interval_ms: u64) -> Self {
        for transition in &mut self.transitions {
            transition.update_interval_ms.get_or_insert(interval_ms);
        }
        self
    }

    /// Encode as the bytes of a start write request.
    pub fn to_write_request(&self) -> Result<Vec<u8>> {
        let entries = self
            .transitions
            .iter()
            .map(TransitionDefinition::to_entry)
            .collect::<Result<Vec<_>>>()?;
        encode_start_request(&entries, MAX_TRANSITION_TLV_BYTES * MAXIMUM_TRANSITIONS * 2)
            .context("Failed to encode start request")
    }
}
