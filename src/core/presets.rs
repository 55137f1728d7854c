//! Built-in session tables

use crate::error::ConfigError;
use crate::types::{Cadence, Cue, PhaseDescriptor, PhaseTable, SampleCondition, TableSpec};
use crate::{
    BREATHING_TOTAL_SECS, DEFAULT_TICK_SECS, DOWN_RATIO_THRESHOLD, EXHALE_SECS, HOLD_DOWN_SECS,
    HOLD_NEUTRAL_SECS, INHALE_SECS, MEDITATION_REMINDER_AT_SECS, MEDITATION_SECS,
    NEUTRAL_RATIO_THRESHOLD,
};

pub const PRESET_NAMES: [&str; 3] = ["breathing", "meditation", "neck"];

/// Inhale/exhale loop, cut off at three minutes
pub fn breathing_spec() -> TableSpec {
    let mut spec = TableSpec::new(
        "breathing",
        vec![
            PhaseDescriptor::timed("INHALE", "Breathe In", INHALE_SECS).with_cue("Breathe In"),
            PhaseDescriptor::timed("EXHALE", "Breathe Out", EXHALE_SECS).with_cue("Breathe Out"),
        ],
    );
    spec.cadence = Cadence::Fixed { interval_secs: DEFAULT_TICK_SECS };
    spec.repeat = true;
    spec.total_limit_secs = Some(BREATHING_TOTAL_SECS);
    spec.opening_cue = Some(Cue::new("Get ready for breathing exercise... Breathe In"));
    spec.completion_cue = Some(Cue::new("Session completed. Great job."));
    spec
}

/// Narrated intro gate, then a six minute timer with a reminder halfway
pub fn meditation_spec() -> TableSpec {
    let focus = "Concentrate on your breathe.";
    let mut spec = TableSpec::new(
        "meditation",
        vec![
            PhaseDescriptor::gate("GUIDE", "Calm yourself and close your eyes.").with_cue(
                "Calm yourself... and close your eyes. Relax your shoulders... and breathe naturally.",
            ),
            PhaseDescriptor::timed("TIMER", focus, MEDITATION_SECS)
                .with_cue(focus)
                .with_reminder(MEDITATION_REMINDER_AT_SECS, focus),
        ],
    );
    spec.completion_cue = Some(Cue::new(
        "Gently open your eyes. You are calm, refreshed, and ready to focus.",
    ));
    spec.ambient = true;
    spec
}

/// Head down, neutral, head down; driven by camera frames
pub fn neck_stretch_spec() -> TableSpec {
    let down = SampleCondition::Below { threshold: DOWN_RATIO_THRESHOLD };
    let neutral = SampleCondition::Above { threshold: NEUTRAL_RATIO_THRESHOLD };
    let mut spec = TableSpec::new(
        "neck",
        vec![
            PhaseDescriptor::held(
                "HOLD_DOWN",
                "Tilt your head forward to your chest, and hold.",
                HOLD_DOWN_SECS,
                down,
            ),
            PhaseDescriptor::held(
                "HOLD_NEUTRAL",
                "Return to neutral position, and hold.",
                HOLD_NEUTRAL_SECS,
                neutral,
            ),
            PhaseDescriptor::held(
                "HOLD_DOWN",
                "Tilt your head forward again, and hold.",
                HOLD_DOWN_SECS,
                down,
            ),
        ],
    );
    spec.cadence = Cadence::Frames;
    spec
}

// Preset specs are constants checked by the tests below
pub fn breathing() -> PhaseTable {
    built(breathing_spec())
}

pub fn meditation() -> PhaseTable {
    built(meditation_spec())
}

pub fn neck_stretch() -> PhaseTable {
    built(neck_stretch_spec())
}

fn built(spec: TableSpec) -> PhaseTable {
    match spec.build() {
        Ok(table) => table,
        Err(err) => unreachable!("built-in preset is invalid: {err}"),
    }
}

/// Look up a preset's `TableSpec` by name
pub fn spec_by_name(name: &str) -> Result<TableSpec, ConfigError> {
    match name.to_ascii_lowercase().as_str() {
        "breathing" | "breath" => Ok(breathing_spec()),
        "meditation" | "meditate" => Ok(meditation_spec()),
        "neck" | "neck_stretch" | "neck-stretch" => Ok(neck_stretch_spec()),
        _ => Err(ConfigError::UnknownPreset(name.to_string())),
    }
}

/// Look up a preset by name
pub fn by_name(name: &str) -> Result<PhaseTable, ConfigError> {
    spec_by_name(name)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for name in PRESET_NAMES {
            assert!(by_name(name).is_ok(), "{} should build", name);
        }
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(by_name("yoga"), Err(ConfigError::UnknownPreset(_))));
    }

    #[test]
    fn test_breathing_shape() {
        let table = breathing();
        assert!(table.repeats());
        assert_eq!(table.total_limit_secs(), Some(180.0));
        assert_eq!(table.pass_duration_secs(), Some(10.0));
    }

    #[test]
    fn test_meditation_starts_with_gate() {
        let table = meditation();
        assert!(table.phases()[0].is_gate());
        assert!(table.ambient());
        assert_eq!(table.phases()[1].reminders.len(), 1);
    }

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(by_name("Neck-Stretch").unwrap().name(), "neck");
        assert_eq!(spec_by_name("meditate").unwrap().name, "meditation");
    }

    #[test]
    fn test_neck_runs_on_frames() {
        let table = neck_stretch();
        assert_eq!(table.cadence(), Cadence::Frames);
        assert_eq!(table.len(), 3);
    }
}
