//! Driver Monitoring System (DMS)
//!
//! Geometric drowsiness scoring from facial landmarks:
//! - Eye aspect ratio (eye closure)
//! - Mouth aspect ratio (yawning)
//! - Head tilt from vertical (nodding)
//!
//! Landmarks come from an external model behind [`LandmarkDetector`].

pub mod analysis;
pub mod config;
pub mod detector;

pub use analysis::{AlertKind, DrowsinessMetrics, Triggers};
pub use config::{DmsConfig, LandmarkLayout, EAR_THRESHOLD, MAR_THRESHOLD, TILT_THRESHOLD_DEGREES};
pub use detector::{Landmark, LandmarkDetector, LandmarkSet, NoModelDetector, StaticLandmarkDetector};

use analysis::{aspect_ratio, head_tilt_degrees};
use config::SixPoint;
use thiserror::Error;
use tracing::debug;

/// DMS error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Landmark {index} missing, face has {available} landmarks")]
    KeypointsMissing { index: usize, available: usize },
}

/// Stateless landmark → drowsiness scorer
#[derive(Debug, Clone, Default)]
pub struct GeometryAnalyzer {
    config: DmsConfig,
}

impl GeometryAnalyzer {
    /// Create a new analyzer, validating the thresholds
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Score the first face of a detection result. Other faces are ignored.
    pub fn analyze_faces(
        &self,
        faces: &[LandmarkSet],
        width: u32,
        height: u32,
    ) -> Result<DrowsinessMetrics, DmsError> {
        match faces.first() {
            Some(face) => {
                if faces.len() > 1 {
                    debug!(faces = faces.len(), "Multiple faces detected, scoring the first");
                }
                self.analyze(face, width, height)
            }
            None => Ok(DrowsinessMetrics::no_face()),
        }
    }

    /// Score one face. An empty set yields all-zero, non-drowsy metrics.
    pub fn analyze(
        &self,
        face: &LandmarkSet,
        width: u32,
        height: u32,
    ) -> Result<DrowsinessMetrics, DmsError> {
        if face.is_empty() {
            return Ok(DrowsinessMetrics::no_face());
        }

        let layout = &self.config.layout;
        let left = aspect_ratio(&six_points(face, &layout.left_eye)?);
        let right = aspect_ratio(&six_points(face, &layout.right_eye)?);
        let ear = (left + right) / 2.0;
        let mar = aspect_ratio(&six_points(face, &layout.mouth)?);
        let head_tilt = head_tilt_degrees(
            face.point(layout.head_top)?,
            face.point(layout.chin)?,
            width,
            height,
        );

        let mut metrics = self.verdict(ear, mar, head_tilt);
        metrics.face_detected = true;
        Ok(metrics)
    }

    /// Apply thresholds to raw ratios. Comparisons are strict.
    pub fn verdict(&self, ear: f64, mar: f64, head_tilt: f64) -> DrowsinessMetrics {
        let triggers = Triggers {
            eyes_closed: ear < self.config.ear_threshold,
            yawning: mar > self.config.mar_threshold,
            head_tilted: head_tilt > self.config.tilt_threshold_degrees,
        };

        DrowsinessMetrics {
            face_detected: true,
            ear,
            mar,
            head_tilt,
            is_drowsy: triggers.any(),
            triggers,
        }
    }
}

fn six_points(face: &LandmarkSet, indices: &SixPoint) -> Result<[Landmark; 6], DmsError> {
    let mut points = [Landmark::default(); 6];
    for (slot, &index) in points.iter_mut().zip(indices) {
        *slot = face.point(index)?;
    }
    Ok(points)
}
