//! Read-only session snapshots for display and the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PhaseTarget, ReasonCode, SessionStatus};

/// Copy of the session pushed to sinks after every tick or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub table: String,
    pub status: SessionStatus,
    pub paused: bool,
    pub phase_index: usize,
    /// Empty once a non-repeating table is exhausted
    pub phase_name: String,
    pub label: String,
    pub target: Option<PhaseTarget>,
    pub phase_elapsed: f64,
    pub total_elapsed: f64,
    /// Seconds until the session limit, if the table has one
    pub total_remaining: Option<f64>,
    /// 1-based cycle for repeating tables
    pub cycle: usize,
    pub phases_completed: u64,
    pub reason: ReasonCode,
}

impl SessionSnapshot {
    /// Seconds left in a timed phase, rounded up the way a countdown shows it
    pub fn phase_countdown(&self) -> Option<u64> {
        match self.target? {
            PhaseTarget::Countdown { secs } => {
                Some((secs - self.phase_elapsed).max(0.0).ceil() as u64)
            }
            _ => None,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = self.status.color_code();
        let reset = SessionStatus::color_reset();
        let pause = if self.paused { " ⏸" } else { "" };

        format!(
            "{}{} {} | {} | total={}{}{}",
            color,
            self.status.emoji(),
            self.label,
            self.progress_string(),
            format_clock(self.total_elapsed),
            pause,
            reset
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "status={} | phase={}:{} | phase_elapsed={:.1}s | total={:.1}s | paused={} | reason={}",
            self.status,
            self.phase_index,
            self.phase_name,
            self.phase_elapsed,
            self.total_elapsed,
            self.paused,
            self.reason.code()
        )
    }

    fn progress_string(&self) -> String {
        match self.target {
            Some(PhaseTarget::Countdown { .. }) => {
                format!("{}", self.phase_countdown().unwrap_or(0))
            }
            Some(PhaseTarget::Hold { secs }) => {
                format!("{} / {}s", self.phase_elapsed.floor() as u64, secs)
            }
            Some(PhaseTarget::Signal) => "…".to_string(),
            None => String::new(),
        }
    }
}

/// `mm:ss`, negative input clamps to zero
pub fn format_clock(secs: f64) -> String {
    let whole = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}
