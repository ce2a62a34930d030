//! Implementation of the `clear` command: erase every stored transition and
//! the persisted logical clock.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::persistence;

pub fn handle_clear_command() -> Result<()> {
    log_version!();

    let config = Config::load()?;
    let mut store = super::open_store(&config)?;
    persistence::clear(&mut store).context("Failed to clear stored transitions")?;

    log_block_start!("Cleared stored transitions");
    log_indented!("{}", store.path().display());
    log_end!();
    Ok(())
}
