//! Command-line command handlers for adaptive-light.
//!
//! Each command lives in its own submodule; the helpers here assemble the
//! pieces they share.

pub mod clear;
pub mod help;
pub mod inspect;
pub mod run;
pub mod simulate;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::callbacks::RecordingCallbacks;
use crate::clock::{Clock, SystemClock, WallClock};
use crate::config::Config;
use crate::persistence::FileStore;

/// Host clock for real runs: wall time when it persists, process time otherwise.
pub(crate) fn host_clock(config: &Config) -> Arc<dyn Clock> {
    if config.clock_persists() {
        Arc::new(WallClock)
    } else {
        Arc::new(SystemClock::new())
    }
}

/// Open the persistent store named by the config.
pub(crate) fn open_store(config: &Config) -> Result<FileStore> {
    let path = config.storage_path()?;
    let store = FileStore::open(&path)
        .with_context(|| format!("Failed to open transition store {}", path.display()))?;
    log_debug!("Using transition store {}", path.display());
    Ok(store)
}

/// Callbacks seeded with every characteristic's initial value.
pub(crate) fn seeded_callbacks(config: &Config, echo: bool) -> RecordingCallbacks {
    let mut callbacks = RecordingCallbacks::new();
    callbacks.values = config.initial_values();
    if echo {
        callbacks = callbacks.echoing();
    }
    callbacks
}
