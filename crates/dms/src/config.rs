//! DMS configuration

use serde::{Deserialize, Serialize};
use crate::DmsError;

/// Eye aspect ratio below which eyes count as closed
pub const EAR_THRESHOLD: f64 = 0.21;

/// Mouth aspect ratio above which the mouth counts as yawning
pub const MAR_THRESHOLD: f64 = 0.50;

/// Head tilt from vertical (degrees) above which the head counts as nodding
pub const TILT_THRESHOLD_DEGREES: f64 = 20.0;

/// Six landmark indices: left corner, two upper points, right corner, two lower points
pub type SixPoint = [usize; 6];

/// Landmark indices used by the geometry analyzer.
///
/// Defaults follow the 468-point MediaPipe Face Mesh topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkLayout {
    pub left_eye: SixPoint,
    pub right_eye: SixPoint,
    pub mouth: SixPoint,
    /// Top of forehead
    pub head_top: usize,
    pub chin: usize,
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self {
            left_eye: [33, 160, 158, 133, 153, 144],
            right_eye: [362, 385, 387, 263, 373, 380],
            mouth: [61, 81, 311, 291, 402, 178],
            head_top: 10,
            chin: 152,
        }
    }
}

impl LandmarkLayout {
    /// Highest index referenced by the layout
    pub fn max_index(&self) -> usize {
        self.left_eye
            .iter()
            .chain(&self.right_eye)
            .chain(&self.mouth)
            .chain([&self.head_top, &self.chin])
            .copied()
            .max()
            .unwrap_or(0)
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Eyes closed when EAR is strictly below this
    pub ear_threshold: f64,

    /// Yawning when MAR is strictly above this
    pub mar_threshold: f64,

    /// Nodding when tilt (degrees) is strictly above this
    pub tilt_threshold_degrees: f64,

    /// Landmark topology
    pub layout: LandmarkLayout,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: EAR_THRESHOLD,
            mar_threshold: MAR_THRESHOLD,
            tilt_threshold_degrees: TILT_THRESHOLD_DEGREES,
            layout: LandmarkLayout::default(),
        }
    }
}

impl DmsConfig {
    /// Reject thresholds that can never or always fire
    pub fn validate(&self) -> Result<(), DmsError> {
        let checks = [
            ("ear_threshold", self.ear_threshold),
            ("mar_threshold", self.mar_threshold),
            ("tilt_threshold_degrees", self.tilt_threshold_degrees),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!("{name} must be a positive number, got {value}")));
            }
        }
        if self.tilt_threshold_degrees >= 180.0 {
            return Err(DmsError::Config("tilt_threshold_degrees must be below 180".into()));
        }
        Ok(())
    }
}
