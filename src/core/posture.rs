//! Head tilt ratio from face-mesh landmarks
//!
//! ratio = (chin.y - nose.y) / |left_cheek.x - right_cheek.x|
//!
//! Scale invariant: dividing by face width cancels distance to the camera.
//! Tilting the head forward shortens the nose-chin projection, so the ratio
//! drops below ~0.35; neutral sits above ~0.40.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::MIN_FACE_WIDTH;

/// Face-mesh landmark indices used for the ratio
pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;
pub const LEFT_CHEEK: usize = 454;
pub const RIGHT_CHEEK: usize = 234;

/// Normalized landmark (0.0-1.0 image coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// `None` when a landmark is missing or the face is too narrow to measure
pub fn head_tilt_ratio(landmarks: &[Landmark]) -> Option<f64> {
    let nose = landmarks.get(NOSE_TIP)?;
    let chin = landmarks.get(CHIN)?;
    let left = landmarks.get(LEFT_CHEEK)?;
    let right = landmarks.get(RIGHT_CHEEK)?;

    let face_width = (left.x - right.x).abs();
    if !face_width.is_finite() || face_width <= MIN_FACE_WIDTH {
        return None;
    }
    let ratio = (chin.y - nose.y) / face_width;
    ratio.is_finite().then_some(ratio)
}

/// Something that yields one optional reading per frame
pub trait SampleProvider {
    /// Outer `None`: no more frames. Inner `None`: frame without a reading.
    fn next_sample(&mut self) -> Option<Option<f64>>;
}

/// Replays a fixed sequence (tests, recorded sessions)
#[derive(Debug, Clone, Default)]
pub struct ScriptedSamples {
    samples: VecDeque<Option<f64>>,
}

impl ScriptedSamples {
    pub fn new(samples: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self { samples: samples.into_iter().collect() }
    }

    /// Parse one reading per line; blank, `-` or unparsable lines are frames without a face
    pub fn parse(text: &str) -> Self {
        Self::new(text.lines().map(parse_sample))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleProvider for ScriptedSamples {
    fn next_sample(&mut self) -> Option<Option<f64>> {
        self.samples.pop_front()
    }
}

/// Parse a single reading
pub fn parse_sample(line: &str) -> Option<f64> {
    line.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
