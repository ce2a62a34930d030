//! Command-line argument parsing and processing.
//!
//! Handles the subcommands (`run`, `simulate`, `inspect`, `clear`) and the
//! global `--config`, `--debug`, `--help` and `--version` flags. Unknown
//! arguments produce a warning and the help text.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Drive the engine against the real clock until interrupted
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
        /// Transition file applied after restore
        request: Option<String>,
    },
    /// Apply a transition file under a simulated clock
    Simulate {
        debug_enabled: bool,
        config_dir: Option<String>,
        request: String,
        /// Simulated seconds to run; defaults to the end of the longest transition
        duration_secs: Option<u64>,
        /// 0 = fast-forward
        multiplier: f64,
        log_file: Option<String>,
    },
    /// Restore stored transitions and print them
    Inspect {
        debug_enabled: bool,
        config_dir: Option<String>,
        json: bool,
    },
    /// Erase stored transitions and the logical clock
    Clear {
        debug_enabled: bool,
        config_dir: Option<String>,
    },

    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

fn error() -> ParsedArgs {
    ParsedArgs {
        action: CliAction::ShowHelpDueToError,
    }
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// `args` includes the program name, as `std::env::args()` does.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut config_dir: Option<String> = None;
        let mut json = false;
        let mut duration_secs: Option<u64> = None;
        let mut multiplier: Option<f64> = None;
        let mut log_file: Option<String> = None;
        let mut positionals: Vec<String> = Vec::new();

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut i = 0;
        while i < args_vec.len() {
            let arg = args_vec[i].as_str();
            match arg {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--debug" | "-d" => debug_enabled = true,
                "--json" => json = true,
                "--config" | "-c" => {
                    let Some(value) = flag_value(&args_vec, i) else {
                        log_warning!("Missing directory for --config. Usage: --config <directory>");
                        return error();
                    };
                    config_dir = Some(value);
                    i += 1;
                }
                "--duration" => {
                    let Some(secs) = flag_value(&args_vec, i).and_then(|v| v.parse::<u64>().ok())
                    else {
                        log_warning!("Invalid --duration. Usage: --duration <seconds>");
                        return error();
                    };
                    duration_secs = Some(secs);
                    i += 1;
                }
                "--multiplier" | "-m" => {
                    let Some(value) = flag_value(&args_vec, i)
                        .and_then(|v| v.parse::<f64>().ok())
                        .filter(|m| m.is_finite() && *m >= 0.0)
                    else {
                        log_warning!(
                            "Invalid --multiplier. Usage: --multiplier <factor> (0 = fast-forward)"
                        );
                        return error();
                    };
                    multiplier = Some(value);
                    i += 1;
                }
                "--log" => {
                    let Some(value) = flag_value(&args_vec, i) else {
                        log_warning!("Missing path for --log. Usage: --log <file>");
                        return error();
                    };
                    log_file = Some(value);
                    i += 1;
                }
                _ if arg.starts_with('-') => {
                    log_warning!("Unknown argument: {}", arg);
                    return error();
                }
                _ => positionals.push(arg.to_string()),
            }
            i += 1;
        }

        // Help and version take precedence over everything else
        if display_version {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if display_help {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }

        let mut positionals = positionals.into_iter();
        let command = positionals.next();
        let operand = positionals.next();
        if let Some(extra) = positionals.next() {
            log_warning!("Unexpected argument: {}", extra);
            return error();
        }

        let command_flags_used = duration_secs.is_some() || multiplier.is_some() || log_file.is_some();

        let action = match command.as_deref() {
            None | Some("run") => {
                if json || command_flags_used {
                    log_warning!("--json, --duration, --multiplier and --log do not apply to run");
                    return error();
                }
                CliAction::Run {
                    debug_enabled,
                    config_dir,
                    request: operand,
                }
            }
            Some("simulate") | Some("sim") => {
                let Some(request) = operand else {
                    log_warning!(
                        "Missing transition file. Usage: adaptive-light simulate <file> [--duration <secs>] [--multiplier <factor>]"
                    );
                    return error();
                };
                if json {
                    log_warning!("--json does not apply to simulate");
                    return error();
                }
                CliAction::Simulate {
                    debug_enabled,
                    config_dir,
                    request,
                    duration_secs,
                    multiplier: multiplier.unwrap_or(0.0),
                    log_file,
                }
            }
            Some("inspect") | Some("i") => {
                if operand.is_some() || command_flags_used {
                    log_warning!("Usage: adaptive-light inspect [--json]");
                    return error();
                }
                CliAction::Inspect {
                    debug_enabled,
                    config_dir,
                    json,
                }
            }
            Some("clear") => {
                if operand.is_some() || json || command_flags_used {
                    log_warning!("Usage: adaptive-light clear");
                    return error();
                }
                CliAction::Clear {
                    debug_enabled,
                    config_dir,
                }
            }
            Some("help") => CliAction::ShowHelp,
            Some("version") => CliAction::ShowVersion,
            Some(other) => {
                log_warning!("Unknown command: {}", other);
                return error();
            }
        };

        ParsedArgs { action }
    }

    /// Parse from the process arguments.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Value following the flag at `idx`, unless it is missing or another flag.
fn flag_value(args: &[String], idx: usize) -> Option<String> {
    args.get(idx + 1)
        .filter(|value| !value.starts_with('-'))
        .cloned()
}
