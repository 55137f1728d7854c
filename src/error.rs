//! Error types for Pacer
//!
//! Three families, matching how failures are treated:
//! - `ConfigError`: bad phase table, raised at construction and fatal
//! - `SessionError`: action not valid in the current session status
//! - `CueError`: narration/audio failure, swallowed by the cue dispatcher

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SessionStatus;

/// Process exit codes for the CLI
pub struct ExitCode;

impl ExitCode {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    /// Invalid phase table or table file
    pub const CONFIG_ERROR: i32 = 2;
    /// File or socket I/O failure
    pub const IO_ERROR: i32 = 3;
    /// Session aborted by the user
    pub const ABANDONED: i32 = 4;
}

/// Top-level error for the binary
#[derive(Debug, Error)]
pub enum PacerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PacerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ExitCode::CONFIG_ERROR,
            Self::Session(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

/// Phase table construction errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("phase table '{0}' has no phases")]
    EmptyTable(String),

    #[error("phase '{phase}' has invalid duration {value} (must be finite and > 0)")]
    InvalidDuration { phase: String, value: f64 },

    #[error("phase '{phase}' has invalid threshold {value}")]
    InvalidThreshold { phase: String, value: f64 },

    #[error("phase '{phase}' has reminder at {at}s outside the phase duration")]
    InvalidReminder { phase: String, at: f64 },

    #[error("total limit {0} must be finite and > 0")]
    InvalidLimit(f64),

    #[error("tick interval {0}s must be finite and at least 1ms")]
    InvalidInterval(f64),

    #[error("repeating table '{0}' needs a total limit")]
    UnboundedRepeat(String),

    #[error("unknown preset '{0}' (expected breathing, meditation or neck)")]
    UnknownPreset(String),

    #[error("failed to read table file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Illegal session actions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session already started ({0})")]
    AlreadyStarted(SessionStatus),

    #[error("session is not running ({0})")]
    NotRunning(SessionStatus),

    #[error("current phase '{0}' is not waiting on a signal")]
    NotAGate(String),
}

/// Narration and audio failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CueError {
    #[error("narration engine busy")]
    Busy,

    #[error("playback blocked: {0}")]
    Blocked(String),

    #[error("cue output unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = PacerError::from(ConfigError::EmptyTable("x".into()));
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);

        let err = PacerError::from(SessionError::NotRunning(SessionStatus::Completed));
        assert_eq!(err.exit_code(), ExitCode::ERROR);
    }

    #[test]
    fn test_messages_name_the_phase() {
        let err = ConfigError::InvalidDuration { phase: "INHALE".into(), value: -1.0 };
        assert!(err.to_string().contains("INHALE"));
        assert!(err.to_string().contains("-1"));
    }
}
