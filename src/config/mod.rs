//! Configuration system for adaptive-light.
//!
//! The configuration file describes the accessory the engine runs for: the
//! service and its characteristics, which of them accept transitions, the
//! engine's pool capacities, and how the logical clock is kept.
//!
//! ## Configuration Sources
//!
//! 1. The directory passed with `--config DIR` (`DIR/adaptive-light.toml`)
//! 2. **XDG_CONFIG_HOME**/adaptive-light/adaptive-light.toml
//!
//! A commented default file is generated on first load.
//!
//! ## Configuration Structure
//!
//! ```toml
//! #[Engine]
//! max_transitions = 2          # Concurrent transitions (1-16)
//! max_transition_points = 52   # Points shared by all transitions (1-1024)
//! update_interval = 60000      # Default update interval in ms for request files
//!
//! #[Clock]
//! clock_persists = false       # Whether the host clock survives restarts
//! clock_persist_interval = 600 # Seconds between logical clock writes (10-86400)
//!
//! #[Service]
//! service_id = 16              # Instance id of the lightbulb service
//!
//! [[characteristic]]
//! id = 18
//! name = "brightness"
//! min = 0
//! max = 100
//! initial = 100
//! transitions = ["linear"]
//! ```
//!
//! Every value is range-checked by [`validation::validate_config`] before the
//! engine sees it.

pub mod builder;
pub mod loading;
pub mod validation;


use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::common::constants::*;
use crate::engine::EngineSettings;
use crate::service::{CharacteristicDescriptor, ServiceDescriptor};
use crate::transition::{SupportedTransition, TRANSITION_TYPE_LINEAR, TRANSITION_TYPE_LINEAR_DERIVED};

pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

/// Transition types a characteristic may accept.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Linear,
    LinearDerived,
}

impl TransitionType {
    pub fn flag(self) -> u8 {
        match self {
            Self::Linear => TRANSITION_TYPE_LINEAR,
            Self::LinearDerived => TRANSITION_TYPE_LINEAR_DERIVED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::LinearDerived => "linear_derived",
        }
    }
}

/// One `[[characteristic]]` table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CharacteristicConfig {
    pub id: u64,
    pub name: Option<String>,
    pub min: i32,
    pub max: i32,
    /// Value the simulated accessory starts with; defaults to `min`
    pub initial: Option<i32>,
    #[serde(default)]
    pub transitions: Vec<TransitionType>,
}

impl CharacteristicConfig {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("0x{:X}", self.id))
    }

    pub fn initial_value(&self) -> i32 {
        self.initial.unwrap_or(self.min)
    }
}

/// Parsed `adaptive-light.toml`.
///
/// Scalar fields are optional and fall back to the defaults in
/// [`crate::common::constants`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub max_transitions: Option<usize>,
    pub max_transition_points: Option<usize>,
    pub update_interval: Option<u64>, // milliseconds
    pub clock_persists: Option<bool>,
    pub clock_persist_interval: Option<u64>, // seconds
    pub storage_dir: Option<String>,
    pub service_id: Option<u64>,
    #[serde(default, rename = "characteristic")]
    pub characteristics: Vec<CharacteristicConfig>,
}

impl Config {
    /// Load configuration using the module's load function
    pub fn load() -> Result<Self> {
        load()
    }

    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        load_from_path(path)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        get_config_path()
    }

    pub fn max_transitions(&self) -> usize {
        self.max_transitions.unwrap_or(DEFAULT_MAX_TRANSITIONS)
    }

    pub fn max_transition_points(&self) -> usize {
        self.max_transition_points
            .unwrap_or(DEFAULT_MAX_TRANSITION_POINTS)
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL_MS)
    }

    pub fn clock_persists(&self) -> bool {
        self.clock_persists.unwrap_or(DEFAULT_CLOCK_PERSISTS)
    }

    pub fn clock_persist_interval_secs(&self) -> u64 {
        self.clock_persist_interval
            .unwrap_or(DEFAULT_CLOCK_PERSIST_INTERVAL_SECS)
    }

    pub fn service_id(&self) -> u64 {
        self.service_id.unwrap_or(DEFAULT_SERVICE_ID)
    }

    pub fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(
            self.service_id(),
            self.characteristics
                .iter()
                .map(|c| CharacteristicDescriptor::new(c.id, c.min, c.max))
                .collect(),
        )
    }

    /// Characteristics that accept at least one transition type.
    pub fn supported_transitions(&self) -> Vec<SupportedTransition> {
        self.characteristics
            .iter()
            .filter(|c| !c.transitions.is_empty())
            .map(|c| {
                let types = c.transitions.iter().fold(0, |acc, t| acc | t.flag());
                SupportedTransition::new(c.id, types)
            })
            .collect()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new(self.service(), self.supported_transitions())
            .with_capacity(self.max_transitions(), self.max_transition_points());
        settings.clock_persist_interval_ms = self.clock_persist_interval_secs() * 1_000;
        settings
    }

    /// Starting value of every configured characteristic.
    pub fn initial_values(&self) -> BTreeMap<u64, i32> {
        self.characteristics
            .iter()
            .map(|c| (c.id, c.initial_value()))
            .collect()
    }

    /// File holding persisted transitions and the logical clock.
    ///
    /// Defaults to the user data directory when `storage_dir` is unset.
    pub fn storage_path(&self) -> Result<PathBuf> {
        let dir = match &self.storage_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("Could not determine data directory")?
                .join(APP_DIR_NAME),
        };
        Ok(dir.join(STORAGE_FILE_NAME))
    }

    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        log_indented!("Service: 0x{:X}", self.service_id());
        log_indented!(
            "Capacity: {} transitions, {} points",
            self.max_transitions(),
            self.max_transition_points()
        );
        log_indented!("Default update interval: {} ms", self.update_interval_ms());
        if self.clock_persists() {
            log_indented!("Clock: host clock persists across restarts");
        } else {
            log_indented!(
                "Clock: logical offset saved every {}s",
                self.clock_persist_interval_secs()
            );
        }
        for c in &self.characteristics {
            let transitions = if c.transitions.is_empty() {
                "none".to_string()
            } else {
                c.transitions
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            log_indented!(
                "Characteristic {} (0x{:X}): {}..{}, initial {}, transitions: {}",
                c.display_name(),
                c.id,
                c.min,
                c.max,
                c.initial_value(),
                transitions
            );
        }
    }
}
