//! Logging setup
//!
//! Session output goes to stdout; logs always go to stderr so `--json`
//! output stays machine-readable. `PACER_LOG` overrides the verbosity flag.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Env var holding a tracing filter directive
pub const LOG_ENV: &str = "PACER_LOG";

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Map `-v` count to a filter directive (0 → warn, saturating at trace)
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(format: LogFormat, verbosity: u8, no_color: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    let use_ansi = !no_color && std::io::stderr().is_terminal();

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_ansi)
                .with_target(verbosity >= 2)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
