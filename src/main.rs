//! Binary entry point: parse arguments, apply the global flags, dispatch.

use adaptive_light::args::{CliAction, ParsedArgs};
use adaptive_light::commands;
use adaptive_light::common::constants::EXIT_FAILURE;
use adaptive_light::common::logger::Log;
use adaptive_light::config;
use adaptive_light::error::AdaptiveLightError;
use adaptive_light::{log_critical, log_end, log_indented, log_pipe};
use anyhow::Result;

fn apply_global_flags(debug_enabled: bool, config_dir: Option<String>) -> Result<()> {
    Log::set_debug(debug_enabled);
    config::set_config_dir(config_dir)
}

fn dispatch(action: CliAction) -> Result<()> {
    match action {
        CliAction::ShowVersion => {
            commands::help::display_version();
            Ok(())
        }
        CliAction::ShowHelp | CliAction::ShowHelpDueToError => {
            commands::help::display_help();
            Ok(())
        }
        CliAction::Run {
            debug_enabled,
            config_dir,
            request,
        } => {
            apply_global_flags(debug_enabled, config_dir)?;
            commands::run::handle_run_command(request.as_deref())
        }
        CliAction::Simulate {
            debug_enabled,
            config_dir,
            request,
            duration_secs,
            multiplier,
            log_file,
        } => {
            apply_global_flags(debug_enabled, config_dir)?;
            commands::simulate::handle_simulate_command(&request, duration_secs, multiplier, log_file)
        }
        CliAction::Inspect {
            debug_enabled,
            config_dir,
            json,
        } => {
            apply_global_flags(debug_enabled, config_dir)?;
            commands::inspect::handle_inspect_command(json)
        }
        CliAction::Clear {
            debug_enabled,
            config_dir,
        } => {
            apply_global_flags(debug_enabled, config_dir)?;
            commands::clear::handle_clear_command()
        }
    }
}

fn main() {
    let parsed_args = ParsedArgs::from_env();
    let show_error = parsed_args.action == CliAction::ShowHelpDueToError;

    if let Err(e) = dispatch(parsed_args.action) {
        Log::set_enabled(true);
        log_pipe!();
        log_critical!("{:#}", e);
        if e
            .chain()
            .any(|cause| matches!(
                cause.downcast_ref::<AdaptiveLightError>(),
                Some(AdaptiveLightError::Storage(_))
            ))
        {
            log_indented!("Stored state could not be read or written; stopping.");
        }
        log_end!();
        std::process::exit(EXIT_FAILURE);
    }

    if show_error {
        std::process::exit(EXIT_FAILURE);
    }
}
