//! Drowsiness metrics and alert classification

use serde::{Deserialize, Serialize};
use crate::detector::Landmark;

/// Alert subtype raised for a drowsy verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Eye closure or head nodding
    Drowsy,
    /// Mouth opening beyond the yawn threshold
    Yawning,
}

impl AlertKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drowsy => "DROWSY",
            AlertKind::Yawning => "YAWNING",
        }
    }
}

/// Which thresholds were breached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggers {
    pub eyes_closed: bool,
    pub yawning: bool,
    pub head_tilted: bool,
}

impl Triggers {
    pub fn any(&self) -> bool {
        self.eyes_closed || self.yawning || self.head_tilted
    }
}

/// Per-frame geometric drowsiness metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessMetrics {
    /// Whether a face was evaluated
    pub face_detected: bool,
    /// Mean eye aspect ratio of both eyes
    pub ear: f64,
    /// Mouth aspect ratio
    pub mar: f64,
    /// Head tilt from vertical, degrees
    pub head_tilt: f64,
    /// True iff at least one trigger fired
    pub is_drowsy: bool,
    pub triggers: Triggers,
}

impl DrowsinessMetrics {
    /// All-zero metrics for a frame without a face. Never drowsy.
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Alert to raise for these metrics, if any
    pub fn alert_kind(&self) -> Option<AlertKind> {
        if !self.is_drowsy {
            None
        } else if self.triggers.yawning {
            Some(AlertKind::Yawning)
        } else {
            Some(AlertKind::Drowsy)
        }
    }
}

/// Aspect ratio of six points ordered left corner, upper, upper, right corner, lower, lower:
/// `(|p2 p6| + |p3 p5|) / (2 |p1 p4|)`. Zero when the horizontal span is zero.
pub fn aspect_ratio(p: &[Landmark; 6]) -> f64 {
    let horizontal = p[0].distance(&p[3]);
    if horizontal == 0.0 {
        return 0.0;
    }
    (p[1].distance(&p[5]) + p[2].distance(&p[4])) / (2.0 * horizontal)
}

/// Angle between the top-of-head → chin vector and the vertical axis, in degrees.
///
/// Deltas are scaled to pixels so non-square frames do not skew the angle.
pub fn head_tilt_degrees(top: Landmark, chin: Landmark, width: u32, height: u32) -> f64 {
    let dx = chin.x * width as f64 - top.x * width as f64;
    let dy = chin.y * height as f64 - top.y * height as f64;
    dx.atan2(dy).to_degrees().abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eye(open: f64) -> [Landmark; 6] {
        [
            Landmark::new(0.0, 0.5),
            Landmark::new(0.33, 0.5 - open),
            Landmark::new(0.66, 0.5 - open),
            Landmark::new(1.0, 0.5),
            Landmark::new(0.66, 0.5 + open),
            Landmark::new(0.33, 0.5 + open),
        ]
    }

    #[test]
    fn test_aspect_ratio_known_value() {
        // vertical distances are 0.2 each, horizontal 1.0
        assert!((aspect_ratio(&eye(0.1)) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_span_is_zero() {
        let p = [Landmark::new(0.5, 0.5); 6];
        assert_eq!(aspect_ratio(&p), 0.0);
    }

    #[test]
    fn test_upright_head_has_no_tilt() {
        let tilt = head_tilt_degrees(Landmark::new(0.5, 0.1), Landmark::new(0.5, 0.9), 640, 480);
        assert_eq!(tilt, 0.0);
    }

    #[test]
    fn test_tilt_uses_pixel_scale() {
        // 0.1 normalized in x at width 480 equals 0.1 in y at height 480 => 45 degrees
        let tilt = head_tilt_degrees(Landmark::new(0.4, 0.4), Landmark::new(0.5, 0.5), 480, 480);
        assert!((tilt - 45.0).abs() < 1e-9);

        // Same normalized deltas on a wide frame tilt further from vertical
        let wide = head_tilt_degrees(Landmark::new(0.4, 0.4), Landmark::new(0.5, 0.5), 960, 480);
        assert!(wide > 45.0);
    }

    #[test]
    fn test_tilt_is_symmetric_left_right() {
        let left = head_tilt_degrees(Landmark::new(0.5, 0.1), Landmark::new(0.4, 0.9), 640, 480);
        let right = head_tilt_degrees(Landmark::new(0.5, 0.1), Landmark::new(0.6, 0.9), 640, 480);
        assert!((left - right).abs() < 1e-9);
    }

    #[test]
    fn test_alert_kind_priority() {
        let mut metrics = DrowsinessMetrics {
            face_detected: true,
            is_drowsy: true,
            triggers: Triggers {
                eyes_closed: true,
                yawning: true,
                head_tilted: false,
            },
            ..Default::default()
        };
        assert_eq!(metrics.alert_kind(), Some(AlertKind::Yawning));

        metrics.triggers.yawning = false;
        assert_eq!(metrics.alert_kind(), Some(AlertKind::Drowsy));

        assert_eq!(DrowsinessMetrics::no_face().alert_kind(), None);
    }

    fn point() -> impl Strategy<Value = Landmark> {
        (0.0f64..1.0, 0.0f64..1.0).prop_map(|(x, y)| Landmark::new(x, y))
    }

    proptest! {
        #[test]
        fn aspect_ratio_non_negative_and_reflection_symmetric(
            p in prop::array::uniform6(point())
        ) {
            let ratio = aspect_ratio(&p);
            prop_assert!(ratio >= 0.0);
            prop_assert!(ratio.is_finite());

            // Reflect: swap corners, swap the two upper and the two lower points
            let reflected = [p[3], p[2], p[1], p[0], p[5], p[4]];
            prop_assert!((aspect_ratio(&reflected) - ratio).abs() < 1e-9);
        }

        #[test]
        fn head_tilt_is_bounded(top in point(), chin in point()) {
            let tilt = head_tilt_degrees(top, chin, 640, 480);
            prop_assert!((0.0..=180.0).contains(&tilt));
        }
    }
}
