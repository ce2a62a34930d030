//! Implementation of the `simulate` command.
//!
//! Applies a transition file to an in-memory engine driven by a simulated
//! clock, printing every value the engine pushes. Fast-forward by default;
//! `--multiplier` slows it to a fixed acceleration.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::clock::{LogicalClock, SimulatedClock};
use crate::common::logger::Log;
use crate::config::Config;
use crate::engine::AdaptiveLight;
use crate::persistence::MemoryStore;
use crate::runtime::{Runner, StopReason, install_shutdown_handler};
use crate::transition::definition::StartRequest;

pub fn handle_simulate_command(
    request_path: &str,
    duration_secs: Option<u64>,
    multiplier: f64,
    log_file: Option<String>,
) -> Result<()> {
    let config = Config::load()?;

    let clock = Arc::new(SimulatedClock::new(0, multiplier));
    Log::set_clock(clock.clone());

    // Keep the guard alive for the whole simulation
    let _log_guard = match log_file {
        Some(path) => Some(
            Log::start_file_logging(path.clone())
                .with_context(|| format!("Failed to start logging to {path}"))?,
        ),
        None => None,
    };

    log_version!();
    log_block_start!("Simulation Mode");
    log_indented!("Transition file: {}", request_path);
    if clock.is_fast_forward() {
        log_indented!("Time acceleration: fast-forward (instant execution)");
    } else {
        log_indented!("Time acceleration: {}x", multiplier);
    }
    match duration_secs {
        Some(secs) => log_indented!("Simulated duration: {}s", secs),
        None => log_indented!("Simulated duration: until every transition completes"),
    }

    let request = StartRequest::load(Path::new(request_path))?
        .with_default_update_interval(config.update_interval_ms());
    let bytes = request.to_write_request()?;

    let mut engine = AdaptiveLight::new(
        config.engine_settings(),
        super::seeded_callbacks(&config, true),
        MemoryStore::new(),
        LogicalClock::new(clock.clone(), true),
    );
    engine.initialize()?;

    log_block_start!("Applying {} transition(s)", request.transitions.len());
    engine
        .handle_write(&bytes)
        .context("Controller write was rejected")?;
    if Log::is_debug() {
        engine.log_transitions();
    }

    let shutdown = install_shutdown_handler()?;
    let mut runner = Runner::new(clock.clone(), shutdown);
    if let Some(secs) = duration_secs {
        runner = runner.until(secs.saturating_mul(1_000));
    }
    let summary = runner.run(&mut engine)?;

    log_block_start!("Simulation finished");
    match summary.reason {
        StopReason::Idle => log_indented!("All transitions completed"),
        StopReason::EndReached => log_indented!(
            "Stopped with {} transition(s) still running",
            engine.transition_count()
        ),
        StopReason::Shutdown => log_indented!("Interrupted"),
    }
    log_indented!("Timer expiries handled: {}", summary.timer_fires);

    let callbacks = engine.callbacks();
    for c in &config.characteristics {
        let updates = callbacks.updates_for(c.id).count();
        if updates == 0 {
            continue;
        }
        let notified = callbacks.updates_for(c.id).filter(|u| u.notify).count();
        log_indented!(
            "{}: final value {}, {} update(s), {} notified",
            c.display_name(),
            callbacks.last_value(c.id).unwrap_or(c.initial_value()),
            updates,
            notified
        );
    }
    log_end!();
    Ok(())
}
