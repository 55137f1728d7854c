//! Events emitted by the session machine
//!
//! The machine never calls sinks itself; it returns these and the controller
//! fans them out to presentation and cue sinks.

use serde::{Deserialize, Serialize};

use crate::types::Cue;

/// What the presentation should count toward in the current phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseTarget {
    /// Counts down from this many seconds
    Countdown { secs: f64 },
    /// Hold the position for this many seconds in total
    Hold { secs: f64 },
    /// Waits for an external signal
    Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A phase became current
    PhaseEntered {
        index: usize,
        name: String,
        label: String,
        target: PhaseTarget,
        cue: Option<Cue>,
        gate: bool,
    },
    /// Counters moved
    Tick { phase_elapsed: f64, total_elapsed: f64 },
    /// A reminder offset was crossed
    Reminder { index: usize, cue: Cue },
    /// Terminal: finished normally or by time limit
    Completed { cue: Option<Cue> },
    /// Terminal: user quit
    Abandoned,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Completed { .. } | SessionEvent::Abandoned)
    }
}
