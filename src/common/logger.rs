//! Structured console logging with box-drawing decoration.
//!
//! Every line goes through [`write_output`], which either prints to stdout or
//! forwards to a background file writer when `--log` style file logging is
//! active. When a simulated clock is installed the engine's logical time is
//! prefixed to every line so accelerated runs stay readable.
//!
//! ## Conventions
//!
//! - `log_block_start!` opens a conceptual block (`┃` spacer, then `┣ message`).
//! - `log_decorated!` continues a block (`┣ message`).
//! - `log_indented!` prints nested detail (`┃   message`).
//! - `log_pipe!` inserts a bare `┃` before a levelled message.
//! - `log_version!` / `log_end!` open and close the whole output.
//! - `log_warning!`, `log_error!`, `log_critical!` carry a
//!   coloured `[LEVEL]` tag. `log_debug!` is only emitted after
//!   [`Log::set_debug`] has been switched on.

use std::io::Write;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};

use once_cell::sync::OnceCell;

use crate::clock::Clock;

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

// Clock used for timestamp prefixes; only installed for simulated runs
static PREFIX_CLOCK: OnceCell<Arc<dyn Clock>> = OnceCell::new();

static LOG_CHANNEL: OnceLock<Option<Sender<LogMessage>>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Global logging switches.
pub struct Log;

impl Log {
    /// Enable or disable all output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Enable or disable `log_debug!` output.
    pub fn set_debug(enabled: bool) {
        DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug() -> bool {
        DEBUG_ENABLED.load(Ordering::SeqCst)
    }

    /// Install the clock whose readings prefix every line.
    ///
    /// Only simulated clocks produce a prefix. The first installation wins.
    pub fn set_clock(clock: Arc<dyn Clock>) {
        let _ = PREFIX_CLOCK.set(clock);
    }

    /// Start routing output to `file_path` through a writer thread.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(Some(tx.clone()))
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::spawn(move || {
            let mut file = std::fs::File::create(&file_path)?;
            loop {
                match rx.recv() {
                    Ok(LogMessage::Formatted(text)) => file.write_all(text.as_bytes())?,
                    Ok(LogMessage::Shutdown) | Err(_) => {
                        file.flush()?;
                        break;
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// `[+HH:MM:SS.mmm] ` for simulated clocks, empty otherwise.
    pub fn get_timestamp_prefix() -> String {
        match PREFIX_CLOCK.get() {
            Some(clock) if clock.is_simulated() => {
                format!("[+{}] ", format_elapsed_ms(clock.now_ms()))
            }
            _ => String::new(),
        }
    }
}

/// Render a millisecond count as `HH:MM:SS.mmm`.
pub fn format_elapsed_ms(ms: u64) -> String {
    let elapsed = chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64);
    let hours = elapsed.num_hours();
    let minutes = elapsed.num_minutes() % 60;
    let seconds = elapsed.num_seconds() % 60;
    let millis = elapsed.num_milliseconds() % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Flushes and joins the file writer on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Route one formatted line to the active sink. Public for macro access.
pub fn write_output(text: &str) {
    if let Some(Some(tx)) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(text)));
    } else {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

/// Emit one decorated line. Shared by every public logging macro.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($lead:expr, $($arg:tt)+) => {{
        use $crate::common::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::get_timestamp_prefix();
            let message = format!($($arg)+);
            let formatted = format!("{prefix}{}{message}\n", $lead);
            $crate::common::logger::write_output(&formatted);
        }
    }};
}

/// Continue the current block: `┣ message`.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_line!("┣ ", $($arg)+) };
}

/// Nested detail: `┃   message`.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_line!("┃   ", $($arg)+) };
}

/// Vertical spacer.
#[macro_export]
macro_rules! log_pipe {
    () => { $crate::__log_line!("┃", "") };
}

/// Open a new block: spacer followed by `┣ message`.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => {{
        $crate::log_pipe!();
        $crate::log_decorated!($($arg)+);
    }};
}

/// Application header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::__log_line!(
            "┏ ",
            "adaptive-light v{} ━━╸",
            env!("CARGO_PKG_VERSION")
        )
    };
}

/// Final termination marker.
#[macro_export]
macro_rules! log_end {
    () => { $crate::__log_line!("╹", "") };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[33mWARNING\x1b[0m] ", $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[31mERROR\x1b[0m] ", $($arg)+) };
}

#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => { $crate::__log_line!("┣[\x1b[31mCRITICAL\x1b[0m] ", $($arg)+) };
}

/// Only printed when debug output is switched on.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {{
        if $crate::common::logger::Log::is_debug() {
            $crate::__log_line!("┣[\x1b[36mDEBUG\x1b[0m] ", $($arg)+);
        }
    }};
}
