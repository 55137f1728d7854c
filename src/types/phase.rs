//! Phase descriptors: what a phase says and how it advances

use serde::{Deserialize, Serialize};

/// A narration line fired on phase entry, at a reminder, or at the end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cue {
    pub text: String,
}

impl Cue {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Predicate over an external scalar sample (e.g. head tilt ratio)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleCondition {
    /// sample < threshold
    Below { threshold: f64 },
    /// sample > threshold
    Above { threshold: f64 },
}

impl SampleCondition {
    /// Missing or non-finite samples never satisfy a condition
    pub fn is_met(&self, sample: Option<f64>) -> bool {
        match sample {
            Some(value) if value.is_finite() => match *self {
                SampleCondition::Below { threshold } => value < threshold,
                SampleCondition::Above { threshold } => value > threshold,
            },
            _ => false,
        }
    }

    pub fn threshold(&self) -> f64 {
        match *self {
            SampleCondition::Below { threshold } | SampleCondition::Above { threshold } => threshold,
        }
    }
}

/// How a phase advances to the next one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "advance", rename_all = "snake_case")]
pub enum Advance {
    /// After `duration_secs` of unpaused time
    Timer { duration_secs: f64 },
    /// After the condition held for `duration_secs` in total.
    /// Time spent with the condition unmet is not credited, but earlier
    /// progress is kept.
    Condition {
        duration_secs: f64,
        condition: SampleCondition,
    },
    /// When an external signal arrives (e.g. intro narration finished)
    Signal,
}

/// Cue fired once when `phase_elapsed` crosses `at_secs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub at_secs: f64,
    pub cue: Cue,
}

/// One stage of a guided session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    /// Stable id, e.g. `INHALE` or `HOLD_DOWN`
    pub name: String,
    /// Instruction text shown to the user
    pub label: String,
    #[serde(flatten)]
    pub advance: Advance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Cue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<Reminder>,
}

impl PhaseDescriptor {
    /// Timer-driven phase
    pub fn timed(name: impl Into<String>, label: impl Into<String>, duration_secs: f64) -> Self {
        Self::with_advance(name, label, Advance::Timer { duration_secs })
    }

    /// Condition-driven phase
    pub fn held(
        name: impl Into<String>,
        label: impl Into<String>,
        duration_secs: f64,
        condition: SampleCondition,
    ) -> Self {
        Self::with_advance(name, label, Advance::Condition { duration_secs, condition })
    }

    /// Gate phase waiting for an external signal
    pub fn gate(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_advance(name, label, Advance::Signal)
    }

    fn with_advance(name: impl Into<String>, label: impl Into<String>, advance: Advance) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            advance,
            on_enter: None,
            reminders: Vec::new(),
        }
    }

    pub fn with_cue(mut self, text: impl Into<String>) -> Self {
        self.on_enter = Some(Cue::new(text));
        self
    }

    pub fn with_reminder(mut self, at_secs: f64, text: impl Into<String>) -> Self {
        self.reminders.push(Reminder { at_secs, cue: Cue::new(text) });
        self
    }

    /// Required duration; `None` for gate phases
    pub fn duration_secs(&self) -> Option<f64> {
        match self.advance {
            Advance::Timer { duration_secs } | Advance::Condition { duration_secs, .. } => {
                Some(duration_secs)
            }
            Advance::Signal => None,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self.advance, Advance::Signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_condition() {
        let cond = SampleCondition::Below { threshold: 0.35 };
        assert!(cond.is_met(Some(0.30)));
        assert!(!cond.is_met(Some(0.35)));
        assert!(!cond.is_met(Some(0.45)));
    }

    #[test]
    fn test_missing_sample_is_not_met() {
        let cond = SampleCondition::Above { threshold: 0.40 };
        assert!(!cond.is_met(None));
        assert!(!cond.is_met(Some(f64::NAN)));
        assert!(cond.is_met(Some(0.41)));
    }

    #[test]
    fn test_duration_by_kind() {
        assert_eq!(PhaseDescriptor::timed("A", "a", 5.0).duration_secs(), Some(5.0));
        let held = PhaseDescriptor::held("B", "b", 3.0, SampleCondition::Above { threshold: 0.4 });
        assert_eq!(held.duration_secs(), Some(3.0));
        assert_eq!(PhaseDescriptor::gate("C", "c").duration_secs(), None);
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = r#"{
            "name": "HOLD_DOWN",
            "label": "Tilt your head forward",
            "advance": "condition",
            "duration_secs": 5.0,
            "condition": { "kind": "below", "threshold": 0.35 },
            "on_enter": "Tilt forward"
        }"#;
        let phase: PhaseDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(phase.name, "HOLD_DOWN");
        assert_eq!(phase.on_enter, Some(Cue::new("Tilt forward")));
        assert_eq!(
            phase.advance,
            Advance::Condition {
                duration_secs: 5.0,
                condition: SampleCondition::Below { threshold: 0.35 },
            }
        );
    }
}
