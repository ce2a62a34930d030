//! # adaptive-light
//!
//! Adaptive lighting transition engine: controllers hand an accessory
//! time-based schedules ("transitions") for its numeric characteristics, and
//! the engine interpolates, notifies, persists and resumes them on its own.
//!
//! ## Architecture
//!
//! - **Engine**: [`engine::AdaptiveLight`] owns live transitions and drives
//!   them from a single wake-up timer
//! - **Transitions**: [`transition`] holds the data model, the pooled store,
//!   validation, interpolation and the TLV8 control-point codec
//! - **Persistence**: [`persistence`] maps transitions and the logical clock
//!   onto a small key-value store (in memory or a JSON file)
//! - **Clock**: [`clock`] provides host, wall and simulated clocks plus the
//!   persisted logical offset
//! - **Application**: `config`, `args`, `commands` and `runtime` wrap the
//!   engine into the `adaptive-light` binary

// Logger must be first for macro availability
#[macro_use]
pub mod common;

pub mod args;
pub mod callbacks;
pub mod clock;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod service;
pub mod timer;
pub mod tlv;
pub mod transition;

pub use engine::{AdaptiveLight, EngineSettings};
pub use error::{AdaptiveLightError, Result};
