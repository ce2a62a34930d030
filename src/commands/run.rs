//! Implementation of the `run` command.
//!
//! Restores stored transitions, optionally applies a transition file, and
//! keeps the engine running against the host clock until SIGINT or SIGTERM.
//! The logical clock is written on the way out so the next run resumes from
//! it.

use anyhow::{Context, Result};
use std::path::Path;

use crate::clock::LogicalClock;
use crate::config::Config;
use crate::engine::AdaptiveLight;
use crate::runtime::{Runner, install_shutdown_handler};
use crate::transition::definition::StartRequest;

pub fn handle_run_command(request_path: Option<&str>) -> Result<()> {
    log_version!();

    let config = Config::load()?;
    config.log_config();

    let store = super::open_store(&config)?;
    let clock = super::host_clock(&config);
    let mut engine = AdaptiveLight::new(
        config.engine_settings(),
        super::seeded_callbacks(&config, true),
        store,
        LogicalClock::new(clock.clone(), config.clock_persists()),
    );

    log_block_start!("Restoring stored transitions");
    let restored = engine
        .initialize()
        .context("Failed to restore stored transitions")?;
    if restored == 0 {
        log_indented!("No stored transitions");
    }

    if let Some(path) = request_path {
        let request = StartRequest::load(Path::new(path))?
            .with_default_update_interval(config.update_interval_ms());
        log_block_start!(
            "Applying {} transition(s) from {}",
            request.transitions.len(),
            path
        );
        engine
            .handle_write(&request.to_write_request()?)
            .context("Controller write was rejected")?;
    }

    if crate::common::logger::Log::is_debug() {
        engine.log_transitions();
    }

    log_block_start!("Running; press Ctrl+C to stop");
    let shutdown = install_shutdown_handler()?;
    let summary = Runner::new(clock, shutdown).run(&mut engine)?;

    if engine.next_clock_persist_at().is_some() {
        engine
            .persist_clock()
            .context("Failed to save the logical clock")?;
    }

    log_block_start!("Shutting down");
    log_indented!("Timer expiries handled: {}", summary.timer_fires);
    log_indented!("Transitions still running: {}", engine.transition_count());
    log_end!();
    Ok(())
}
