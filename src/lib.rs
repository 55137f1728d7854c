//! Pacer: guided wellness session engine
//!
//! Phase tables → SessionMachine → cue and presentation sinks

pub mod core;
pub mod error;
pub mod logging;
pub mod types;

// =============================================================================
// BREATHING
// =============================================================================

/// Whole breathing session (seconds)
pub const BREATHING_TOTAL_SECS: f64 = 180.0;

/// Inhale phase length (seconds)
pub const INHALE_SECS: f64 = 5.0;

/// Exhale phase length (seconds)
pub const EXHALE_SECS: f64 = 5.0;

// =============================================================================
// MEDITATION
// =============================================================================

/// Timed meditation phase (seconds) - 6 minutes
pub const MEDITATION_SECS: f64 = 360.0;

/// Offset inside the timed phase where the reminder is spoken
pub const MEDITATION_REMINDER_AT_SECS: f64 = 180.0;

// =============================================================================
// NECK STRETCH - head tilt ratio thresholds
// =============================================================================

/// Head is down when ratio < 0.35
pub const DOWN_RATIO_THRESHOLD: f64 = 0.35;

/// Head is neutral when ratio > 0.40
pub const NEUTRAL_RATIO_THRESHOLD: f64 = 0.40;

/// Hold time for a head-down step (seconds)
pub const HOLD_DOWN_SECS: f64 = 5.0;

/// Hold time for the neutral step (seconds)
pub const HOLD_NEUTRAL_SECS: f64 = 3.0;

/// Faces narrower than this (normalized units) give no ratio
pub const MIN_FACE_WIDTH: f64 = 0.01;

// =============================================================================
// TIMING
// =============================================================================

/// Default tick cadence for timer-driven screens (seconds)
pub const DEFAULT_TICK_SECS: f64 = 1.0;

/// Shortest interval a fixed cadence may tick at (seconds)
pub const MIN_TICK_SECS: f64 = 0.001;

/// Any single frame delta above this is dropped (tab backgrounded, stall)
pub const STALL_GUARD_SECS: f64 = 0.5;

/// Tolerance for comparing accumulated float seconds against targets
pub const TIME_EPSILON: f64 = 1e-9;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
