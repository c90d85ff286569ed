//! Facial landmark types and the landmark detector seam

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::DmsError;

/// A 2D landmark in normalized frame coordinates (x, y in [0, 1])
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in normalized space
    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Ordered landmarks for one face. Empty when no face was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Landmark at `index`, or `KeypointsMissing` if the set is too short
    pub fn point(&self, index: usize) -> Result<Landmark, DmsError> {
        self.points
            .get(index)
            .copied()
            .ok_or(DmsError::KeypointsMissing {
                index,
                available: self.points.len(),
            })
    }
}

/// External facial landmark model.
///
/// Returns one `LandmarkSet` per detected face; an empty vector means no face.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<LandmarkSet>, DmsError>;
}

/// Stand-in used when no landmark model is configured: never finds a face.
#[derive(Debug, Default)]
pub struct NoModelDetector;

impl NoModelDetector {
    pub fn new() -> Self {
        warn!("No landmark model configured. Every frame will report no face.");
        Self
    }
}

impl LandmarkDetector for NoModelDetector {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<LandmarkSet>, DmsError> {
        Ok(Vec::new())
    }
}

/// Detector that returns the same faces for every frame (replays, tests)
#[derive(Debug, Clone, Default)]
pub struct StaticLandmarkDetector {
    faces: Vec<LandmarkSet>,
}

impl StaticLandmarkDetector {
    pub fn new(faces: Vec<LandmarkSet>) -> Self {
        Self { faces }
    }
}

impl LandmarkDetector for StaticLandmarkDetector {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<LandmarkSet>, DmsError> {
        Ok(self.faces.clone())
    }
}
