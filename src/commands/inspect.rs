//! Implementation of the `inspect` command.
//!
//! Restores the stored transitions into a throwaway engine and prints them,
//! either through the logger or as JSON on stdout.

use anyhow::{Context, Result};

use crate::clock::LogicalClock;
use crate::config::Config;
use crate::engine::AdaptiveLight;

pub fn handle_inspect_command(json: bool) -> Result<()> {
    if json {
        // Keep stdout clean for the JSON document
        crate::common::logger::Log::set_enabled(false);
    }

    let config = Config::load()?;
    let store = super::open_store(&config)?;
    let clock = super::host_clock(&config);
    let mut engine = AdaptiveLight::new(
        config.engine_settings(),
        super::seeded_callbacks(&config, false),
        store,
        LogicalClock::new(clock, config.clock_persists()),
    );
    engine
        .initialize()
        .context("Failed to restore stored transitions")?;

    if json {
        let snapshot = engine.snapshot();
        let output =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        println!("{output}");
        return Ok(());
    }

    log_version!();
    if engine.transition_count() == 0 {
        log_block_start!("No stored transitions");
    } else {
        engine.log_transitions();
    }
    log_end!();
    Ok(())
}
