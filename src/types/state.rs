//! Session status and mutable session state

use serde::{Deserialize, Serialize};

/// Top-level lifecycle of a guided session
///
/// `NotStarted → Running → {Completed | Abandoned}`. Pause is a flag on
/// `SessionState`, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Screen loaded, first phase not entered yet
    NotStarted,
    /// Phases advancing
    Running,
    /// All phases done or the session limit was reached
    Completed,
    /// User quit
    Abandoned,
}

impl SessionStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "\x1b[90m", // Gray
            SessionStatus::Running => "\x1b[36m",    // Cyan
            SessionStatus::Completed => "\x1b[32m",  // Green
            SessionStatus::Abandoned => "\x1b[31m",  // Red
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "⏳",
            SessionStatus::Running => "🌬",
            SessionStatus::Completed => "✅",
            SessionStatus::Abandoned => "✖",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::NotStarted => "NOT_STARTED",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Abandoned => "ABANDONED",
        };
        write!(f, "{}", name)
    }
}

/// Counters owned by the session machine. Sinks only ever see copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// 0-based, only moves forward (time, condition, gate or skip)
    pub phase_index: usize,
    /// Seconds credited to the current phase; reset on every transition
    pub phase_elapsed: f64,
    /// Seconds of unpaused session time
    pub total_elapsed: f64,
    pub paused: bool,
    pub status: SessionStatus,
    /// Phases finished by timer, condition or gate (skips excluded)
    pub phases_completed: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase_index: 0,
            phase_elapsed: 0.0,
            total_elapsed: 0.0,
            paused: false,
            status: SessionStatus::NotStarted,
            phases_completed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::NotStarted.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&SessionStatus::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
        assert_eq!(SessionStatus::NotStarted.to_string(), "NOT_STARTED");
    }

    #[test]
    fn test_fresh_state() {
        let state = SessionState::new();
        assert_eq!(state.phase_index, 0);
        assert_eq!(state.status, SessionStatus::NotStarted);
        assert!(!state.paused);
    }
}
