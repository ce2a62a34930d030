//! Configuration validation functionality.
//!
//! Rejects values the engine cannot honor: empty or oversized pools,
//! update intervals outside the accepted window, inverted characteristic
//! ranges and supported-transition tables larger than the transition pool.

use anyhow::Result;
use std::collections::HashSet;

use super::Config;
use crate::common::constants::*;

pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(max) = config.max_transitions
        && !(1..=MAXIMUM_TRANSITIONS).contains(&max)
    {
        anyhow::bail!(
            "max_transitions ({}) must be between 1 and {}",
            max,
            MAXIMUM_TRANSITIONS
        );
    }

    if let Some(max) = config.max_transition_points
        && !(1..=MAXIMUM_TRANSITION_POINTS).contains(&max)
    {
        anyhow::bail!(
            "max_transition_points ({}) must be between 1 and {}",
            max,
            MAXIMUM_TRANSITION_POINTS
        );
    }

    if let Some(interval) = config.update_interval
        && !(MIN_TARGET_COMPLETION_DURATION_MS..=MAXIMUM_UPDATE_INTERVAL_MS).contains(&interval)
    {
        anyhow::bail!(
            "update_interval ({} ms) must be between {} and {} milliseconds",
            interval,
            MIN_TARGET_COMPLETION_DURATION_MS,
            MAXIMUM_UPDATE_INTERVAL_MS
        );
    }

    if let Some(interval) = config.clock_persist_interval
        && !(MINIMUM_CLOCK_PERSIST_INTERVAL_SECS..=MAXIMUM_CLOCK_PERSIST_INTERVAL_SECS)
            .contains(&interval)
    {
        anyhow::bail!(
            "clock_persist_interval ({}s) must be between {} and {} seconds",
            interval,
            MINIMUM_CLOCK_PERSIST_INTERVAL_SECS,
            MAXIMUM_CLOCK_PERSIST_INTERVAL_SECS
        );
    }

    if let Some(dir) = &config.storage_dir
        && dir.trim().is_empty()
    {
        anyhow::bail!("storage_dir must not be empty");
    }

    validate_characteristics(config)
}

fn validate_characteristics(config: &Config) -> Result<()> {
    if config.characteristics.is_empty() {
        anyhow::bail!("At least one [[characteristic]] must be configured");
    }

    let mut seen = HashSet::new();
    for c in &config.characteristics {
        if !seen.insert(c.id) {
            anyhow::bail!("Characteristic id 0x{:X} is configured more than once", c.id);
        }

        if c.min > c.max {
            anyhow::bail!(
                "Characteristic {}: min ({}) must not exceed max ({})",
                c.display_name(),
                c.min,
                c.max
            );
        }

        if let Some(initial) = c.initial
            && !(c.min..=c.max).contains(&initial)
        {
            anyhow::bail!(
                "Characteristic {}: initial value {} is outside {}..={}",
                c.display_name(),
                initial,
                c.min,
                c.max
            );
        }

        let mut types = HashSet::new();
        for t in &c.transitions {
            if !types.insert(*t) {
                anyhow::bail!(
                    "Characteristic {}: transition type '{}' listed twice",
                    c.display_name(),
                    t.as_str()
                );
            }
        }
    }

    let supported = config.supported_transitions().len();
    if supported > config.max_transitions() {
        anyhow::bail!(
            "{} characteristics accept transitions but max_transitions is {}",
            supported,
            config.max_transitions()
        );
    }

    Ok(())
}
