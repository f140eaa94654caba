//! Console logging: timestamped, leveled output and the audible alert.
//!
//! Every line is prefixed with the local wall-clock time, e.g.
//!
//! ```text
//! [14:02:31]  INFO sass: compiled style.scss -> css/style.css
//! ```

use std::fmt;
use std::io::{self, Write};

use chrono::Local;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

/// Width of separator banners
const SEPARATOR_WIDTH: usize = 69;

/// BEL control character
const BEEP: &str = "\x07";

/// `[HH:MM:SS]` local time stamp
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%H:%M:%S"))
    }
}

/// Default filter directive for the verbosity flags
pub fn filter_directive(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global console subscriber. `RUST_LOG` overrides the flags.
pub fn init(verbose: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, debug)));

    // Ignore the error if a subscriber is already set (e.g. in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ClockTime)
        .with_target(debug)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

/// Build a `== label ====` banner line
pub fn banner(label: &str) -> String {
    let label = if label.is_empty() {
        String::new()
    } else {
        format!(" {} ", label.to_uppercase())
    };
    let fill = SEPARATOR_WIDTH.saturating_sub(2 + label.chars().count());
    format!("=={label}{}", "=".repeat(fill))
}

/// Log a separator banner
pub fn separator(label: &str) {
    tracing::info!("{}", banner(label));
}

/// Completion/failure notifier with optional audible alert
#[derive(Debug, Clone, Copy, Default)]
pub struct Alert {
    beep: bool,
}

impl Alert {
    pub fn new(beep: bool) -> Self {
        Self { beep }
    }

    /// Announce a finished task
    pub fn done(&self, task: &str) {
        tracing::info!("{} done", task.to_uppercase());
        self.ring();
    }

    /// Announce a failed task
    pub fn failed(&self, task: &str) {
        tracing::error!("{} failed", task.to_uppercase());
        self.ring();
    }

    fn ring(&self) {
        if self.beep {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(BEEP.as_bytes());
            let _ = stderr.flush();
        }
    }
}
