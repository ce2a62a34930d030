//! Default configuration file generation.
//!
//! The builder aligns every setting's trailing comment into one column so the
//! generated file stays readable.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;

/// Write a commented default `adaptive-light.toml` to `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write config to {}", path.display()))
}

/// Contents of the generated default config.
pub fn default_config_content() -> String {
    let (brightness_min, brightness_max) = DEFAULT_BRIGHTNESS_RANGE;
    let (temperature_min, temperature_max) = DEFAULT_COLOR_TEMPERATURE_RANGE;

    ConfigBuilder::new()
        .add_section("Engine")
        .add_setting(
            "max_transitions",
            &DEFAULT_MAX_TRANSITIONS.to_string(),
            &format!("Concurrent transitions (1-{MAXIMUM_TRANSITIONS})"),
        )
        .add_setting(
            "max_transition_points",
            &DEFAULT_MAX_TRANSITION_POINTS.to_string(),
            &format!("Points shared by all transitions (1-{MAXIMUM_TRANSITION_POINTS})"),
        )
        .add_setting(
            "update_interval",
            &DEFAULT_UPDATE_INTERVAL_MS.to_string(),
            &format!(
                "Default update interval for request files ({MIN_TARGET_COMPLETION_DURATION_MS}-{MAXIMUM_UPDATE_INTERVAL_MS})ms"
            ),
        )
        .add_section("Clock")
        .add_setting(
            "clock_persists",
            &DEFAULT_CLOCK_PERSISTS.to_string(),
            "Whether the host clock survives restarts",
        )
        .add_setting(
            "clock_persist_interval",
            &DEFAULT_CLOCK_PERSIST_INTERVAL_SECS.to_string(),
            &format!(
                "Seconds between logical clock writes ({MINIMUM_CLOCK_PERSIST_INTERVAL_SECS}-{MAXIMUM_CLOCK_PERSIST_INTERVAL_SECS})"
            ),
        )
        .add_section("Service")
        .add_setting(
            "service_id",
            &DEFAULT_SERVICE_ID.to_string(),
            "Instance id of the lightbulb service",
        )
        .add_table("characteristic")
        .add_setting("id", &DEFAULT_BRIGHTNESS_ID.to_string(), "Brightness")
        .add_setting("name", "\"brightness\"", "Display name")
        .add_setting("min", &brightness_min.to_string(), "Lowest value")
        .add_setting("max", &brightness_max.to_string(), "Highest value")
        .add_setting(
            "initial",
            &DEFAULT_BRIGHTNESS_INITIAL.to_string(),
            "Value before any transition runs",
        )
        .add_setting(
            "transitions",
            "[\"linear\"]",
            "Accepted types: \"linear\", \"linear_derived\"",
        )
        .add_table("characteristic")
        .add_setting(
            "id",
            &DEFAULT_COLOR_TEMPERATURE_ID.to_string(),
            "Color temperature",
        )
        .add_setting("name", "\"color_temperature\"", "Display name")
        .add_setting("min", &temperature_min.to_string(), "Lowest value (mired)")
        .add_setting("max", &temperature_max.to_string(), "Highest value (mired)")
        .add_setting(
            "initial",
            &DEFAULT_COLOR_TEMPERATURE_INITIAL.to_string(),
            "Value before any transition runs",
        )
        .add_setting(
            "transitions",
            "[\"linear\", \"linear_derived\"]",
            "May follow brightness",
        )
        .build()
}

struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Table(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    /// Start an array-of-tables entry; following settings belong to it.
    fn add_table(mut self, name: &str) -> Self {
        self.entries.push(ConfigEntry::Table(format!("[[{name}]]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        for entry in self.entries {
            match entry {
                ConfigEntry::Section(header) | ConfigEntry::Table(header) => {
                    if !result.is_empty() {
                        result.push(String::new());
                    }
                    result.push(header);
                }
                ConfigEntry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }

        let mut content = result.join("\n");
        content.push('\n');
        content
    }
}
