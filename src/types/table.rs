//! Phase tables
//!
//! `TableSpec` is the loadable description; `PhaseTable` is the validated,
//! immutable form a session runs on. Invalid tables fail at `build()`,
//! never mid-session.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{Advance, Cue, PhaseDescriptor};
use crate::MIN_TICK_SECS;

/// Where ticks come from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Periodic timer, fixed step per tick
    Fixed { interval_secs: f64 },
    /// One tick per sensor frame, wall-clock delta with stall guard
    Frames,
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::Fixed { interval_secs: crate::DEFAULT_TICK_SECS }
    }
}

/// Unvalidated table description (JSON files, API requests, presets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub phases: Vec<PhaseDescriptor>,
    #[serde(default)]
    pub cadence: Cadence,
    /// Cycle through `phases` until the total limit
    #[serde(default)]
    pub repeat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_limit_secs: Option<f64>,
    /// Spoken at start in place of the first phase's cue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_cue: Option<Cue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_cue: Option<Cue>,
    /// Play background audio while running
    #[serde(default)]
    pub ambient: bool,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, phases: Vec<PhaseDescriptor>) -> Self {
        Self {
            name: name.into(),
            phases,
            cadence: Cadence::default(),
            repeat: false,
            total_limit_secs: None,
            opening_cue: None,
            completion_cue: None,
            ambient: false,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Validate and freeze
    pub fn build(self) -> Result<PhaseTable, ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::EmptyTable(self.name));
        }

        if let Cadence::Fixed { interval_secs } = self.cadence {
            if tick_interval(interval_secs).is_none() {
                return Err(ConfigError::InvalidInterval(interval_secs));
            }
        }

        match self.total_limit_secs {
            Some(limit) if !is_positive(limit) => return Err(ConfigError::InvalidLimit(limit)),
            None if self.repeat => return Err(ConfigError::UnboundedRepeat(self.name)),
            _ => {}
        }

        for phase in &self.phases {
            validate_phase(phase)?;
        }

        Ok(PhaseTable {
            name: self.name,
            phases: self.phases,
            cadence: self.cadence,
            repeat: self.repeat,
            total_limit_secs: self.total_limit_secs,
            opening_cue: self.opening_cue,
            completion_cue: self.completion_cue,
            ambient: self.ambient,
        })
    }
}

/// Interval as a `Duration`, if it is representable and at least 1ms
pub fn tick_interval(interval_secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(interval_secs)
        .ok()
        .filter(|interval| interval.as_secs_f64() >= MIN_TICK_SECS)
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_phase(phase: &PhaseDescriptor) -> Result<(), ConfigError> {
    if let Advance::Condition { condition, .. } = &phase.advance {
        let threshold = condition.threshold();
        if !threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                phase: phase.name.clone(),
                value: threshold,
            });
        }
    }

    let duration = phase.duration_secs();
    if let Some(value) = duration {
        if !is_positive(value) {
            return Err(ConfigError::InvalidDuration {
                phase: phase.name.clone(),
                value,
            });
        }
    }

    for reminder in &phase.reminders {
        // Gates have no length, so any positive offset is reachable
        let upper = duration.unwrap_or(f64::INFINITY);
        if !is_positive(reminder.at_secs) || reminder.at_secs >= upper {
            return Err(ConfigError::InvalidReminder {
                phase: phase.name.clone(),
                at: reminder.at_secs,
            });
        }
    }

    Ok(())
}

/// Validated, immutable phase table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTable {
    name: String,
    phases: Vec<PhaseDescriptor>,
    cadence: Cadence,
    repeat: bool,
    total_limit_secs: Option<f64>,
    opening_cue: Option<Cue>,
    completion_cue: Option<Cue>,
    ambient: bool,
}

impl PhaseTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    /// Number of distinct phases (one cycle for repeating tables)
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false for a built table
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Descriptor for a phase index, `None` once a non-repeating table is exhausted
    pub fn phase(&self, index: usize) -> Option<&PhaseDescriptor> {
        if self.repeat {
            self.phases.get(index % self.phases.len())
        } else {
            self.phases.get(index)
        }
    }

    /// 0-based cycle number for a phase index
    pub fn cycle_of(&self, index: usize) -> usize {
        index / self.phases.len()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn repeats(&self) -> bool {
        self.repeat
    }

    pub fn total_limit_secs(&self) -> Option<f64> {
        self.total_limit_secs
    }

    pub fn opening_cue(&self) -> Option<&Cue> {
        self.opening_cue.as_ref()
    }

    pub fn completion_cue(&self) -> Option<&Cue> {
        self.completion_cue.as_ref()
    }

    pub fn ambient(&self) -> bool {
        self.ambient
    }

    /// Sum of one pass over the phases; `None` if any phase is a gate
    pub fn pass_duration_secs(&self) -> Option<f64> {
        self.phases.iter().map(|p| p.duration_secs()).sum()
    }
}
