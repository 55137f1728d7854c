//! Reason codes for tick outcomes and session actions

use serde::{Deserialize, Serialize};

/// Why the last tick or action had the effect it had
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // R001: Tick handling
    // =========================================================================
    /// Tick arrived while paused, counters untouched
    R001_TICK_IGNORED_PAUSED,
    /// Tick arrived before start
    R001_TICK_IGNORED_NOT_STARTED,
    /// Tick arrived after the session ended
    R001_TICK_IGNORED_TERMINAL,

    // =========================================================================
    // R002: Phase progress
    // =========================================================================
    /// Session started, first phase entered
    R002_SESSION_STARTED,
    /// Timer phase accumulating
    R002_TIMER_RUNNING,
    /// Gate phase waiting for its signal
    R002_AWAITING_SIGNAL,

    // =========================================================================
    // R003: Condition phases
    // =========================================================================
    /// Sample satisfied the condition, time credited
    R003_CONDITION_MET,
    /// Sample present but condition not satisfied, progress kept
    R003_CONDITION_NOT_MET,
    /// No sample this tick, treated as not satisfied
    R003_SAMPLE_MISSING,

    // =========================================================================
    // R004: Transitions
    // =========================================================================
    /// Phase finished and the next one was entered
    R004_PHASE_ADVANCED,
    /// User skipped the phase
    R004_PHASE_SKIPPED,
    /// Gate signal arrived
    R004_GATE_OPENED,
    /// Pause flag set
    R004_PAUSED,
    /// Pause flag cleared
    R004_RESUMED,

    // =========================================================================
    // R005: Terminal
    // =========================================================================
    /// Last phase finished
    R005_ALL_PHASES_DONE,
    /// Session-level total limit reached
    R005_TIME_LIMIT_REACHED,
    /// User quit
    R005_ABANDONED,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R001_TICK_IGNORED_PAUSED => "R001_TICK_IGNORED_PAUSED",
            Self::R001_TICK_IGNORED_NOT_STARTED => "R001_TICK_IGNORED_NOT_STARTED",
            Self::R001_TICK_IGNORED_TERMINAL => "R001_TICK_IGNORED_TERMINAL",
            Self::R002_SESSION_STARTED => "R002_SESSION_STARTED",
            Self::R002_TIMER_RUNNING => "R002_TIMER_RUNNING",
            Self::R002_AWAITING_SIGNAL => "R002_AWAITING_SIGNAL",
            Self::R003_CONDITION_MET => "R003_CONDITION_MET",
            Self::R003_CONDITION_NOT_MET => "R003_CONDITION_NOT_MET",
            Self::R003_SAMPLE_MISSING => "R003_SAMPLE_MISSING",
            Self::R004_PHASE_ADVANCED => "R004_PHASE_ADVANCED",
            Self::R004_PHASE_SKIPPED => "R004_PHASE_SKIPPED",
            Self::R004_GATE_OPENED => "R004_GATE_OPENED",
            Self::R004_PAUSED => "R004_PAUSED",
            Self::R004_RESUMED => "R004_RESUMED",
            Self::R005_ALL_PHASES_DONE => "R005_ALL_PHASES_DONE",
            Self::R005_TIME_LIMIT_REACHED => "R005_TIME_LIMIT_REACHED",
            Self::R005_ABANDONED => "R005_ABANDONED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R001_TICK_IGNORED_PAUSED => "Paused",
            Self::R001_TICK_IGNORED_NOT_STARTED => "Not started",
            Self::R001_TICK_IGNORED_TERMINAL => "Session over",
            Self::R002_SESSION_STARTED => "Session started",
            Self::R002_TIMER_RUNNING => "Timer running",
            Self::R002_AWAITING_SIGNAL => "Waiting for guidance to finish",
            Self::R003_CONDITION_MET => "Holding position",
            Self::R003_CONDITION_NOT_MET => "Position not reached",
            Self::R003_SAMPLE_MISSING => "No reading",
            Self::R004_PHASE_ADVANCED => "Next phase",
            Self::R004_PHASE_SKIPPED => "Phase skipped",
            Self::R004_GATE_OPENED => "Guidance finished",
            Self::R004_PAUSED => "Paused",
            Self::R004_RESUMED => "Resumed",
            Self::R005_ALL_PHASES_DONE => "All phases done",
            Self::R005_TIME_LIMIT_REACHED => "Session time reached",
            Self::R005_ABANDONED => "Session abandoned",
        }
    }

    /// Did this outcome move to another phase or end the session?
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            Self::R002_SESSION_STARTED
                | Self::R004_PHASE_ADVANCED
                | Self::R004_PHASE_SKIPPED
                | Self::R004_GATE_OPENED
                | Self::R005_ALL_PHASES_DONE
                | Self::R005_TIME_LIMIT_REACHED
                | Self::R005_ABANDONED
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
