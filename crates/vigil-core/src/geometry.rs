//! Detection → pose normalization with a frontal-face quality gate.
//!
//! The gate compares the vertical offset between the two eyes against their
//! horizontal spacing. A ratio above 0.15 corresponds to a head roll of
//! roughly 8.5° and is rejected: tilted faces give unstable geometry and are
//! a common artefact of a photo held at an angle.
//!
//! Each eye is anchored on the *first* landmark of its region rather than
//! the region centroid. Moving the anchor shifts the acceptance boundary, so
//! it stays put.

use crate::types::{Detection, Point, PoseRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum `eye_level_diff / eye_distance` ratio.
pub const DEFAULT_MAX_EYE_TILT_RATIO: f32 = 0.15;

/// Landmark numbering scheme of the face model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkLayout {
    /// 68-point iBUG layout: left eye 36–41, right eye 42–47.
    #[default]
    Ibug68,
    /// 5-point SCRFD layout: left eye, right eye, nose, mouth corners.
    Scrfd5,
}

impl LandmarkLayout {
    /// Index of the first point of the left eye region.
    pub fn left_eye_start(self) -> usize {
        match self {
            LandmarkLayout::Ibug68 => 36,
            LandmarkLayout::Scrfd5 => 0,
        }
    }

    /// Index of the first point of the right eye region.
    pub fn right_eye_start(self) -> usize {
        match self {
            LandmarkLayout::Ibug68 => 42,
            LandmarkLayout::Scrfd5 => 1,
        }
    }

    pub fn point_count(self) -> usize {
        match self {
            LandmarkLayout::Ibug68 => 68,
            LandmarkLayout::Scrfd5 => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub layout: LandmarkLayout,
    pub max_eye_tilt_ratio: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            layout: LandmarkLayout::default(),
            max_eye_tilt_ratio: DEFAULT_MAX_EYE_TILT_RATIO,
        }
    }
}

/// Why a frame produced no usable pose. Callers treat every variant the same
/// way: no evidence this frame, try the next one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("no face detected")]
    NoFace,
    #[error("detector score {score:.2} below {min:.2}")]
    LowConfidence { score: f32, min: f32 },
    #[error("face not frontal (eye diff {eye_level_diff:.1}px, distance {eye_distance:.1}px)")]
    NotFrontal {
        eye_level_diff: f32,
        eye_distance: f32,
    },
    #[error("expected {expected} landmarks, got {got}")]
    MissingLandmarks { expected: usize, got: usize },
    #[error("degenerate face box")]
    DegenerateBox,
}

/// Converts raw detections into [`PoseRecord`]s.
#[derive(Debug, Clone)]
pub struct GeometryNormalizer {
    config: GeometryConfig,
    min_score: f32,
}

impl GeometryNormalizer {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            min_score: 0.0,
        }
    }

    /// Also reject detections scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Normalize one frame's detection (or absence of one).
    pub fn normalize(&self, detection: Option<&Detection>) -> Result<PoseRecord, Rejection> {
        let detection = detection.ok_or(Rejection::NoFace)?;

        if detection.score < self.min_score {
            return Err(Rejection::LowConfidence {
                score: detection.score,
                min: self.min_score,
            });
        }

        let (left, right) = self.eye_anchors(&detection.landmarks)?;
        let eye_level_diff = (left.y - right.y).abs();
        let eye_distance = (left.x - right.x).abs();

        // False for NaN geometry as well, which is rejected with the rest.
        let frontal = eye_level_diff <= self.config.max_eye_tilt_ratio * eye_distance;
        if !frontal {
            return Err(Rejection::NotFrontal {
                eye_level_diff,
                eye_distance,
            });
        }

        PoseRecord::new(detection.bbox, detection.landmarks.clone()).ok_or(Rejection::DegenerateBox)
    }

    fn eye_anchors(&self, landmarks: &[Point]) -> Result<(Point, Point), Rejection> {
        let layout = self.config.layout;
        let needed = layout.left_eye_start().max(layout.right_eye_start()) + 1;
        match (
            landmarks.get(layout.left_eye_start()),
            landmarks.get(layout.right_eye_start()),
        ) {
            (Some(left), Some(right)) => Ok((*left, *right)),
            _ => Err(Rejection::MissingLandmarks {
                expected: needed,
                got: landmarks.len(),
            }),
        }
    }
}

impl Default for GeometryNormalizer {
    fn default() -> Self {
        Self::new(GeometryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Descriptor};

    /// 68-point landmark set with the two eye anchors placed explicitly.
    fn ibug_landmarks(left: Point, right: Point) -> Vec<Point> {
        let mut points = vec![Point::default(); 68];
        points[36] = left;
        points[42] = right;
        points
    }

    fn detection(landmarks: Vec<Point>) -> Detection {
        Detection {
            bbox: BoundingBox {
                x: 100.0,
                y: 80.0,
                width: 120.0,
                height: 140.0,
            },
            score: 0.9,
            landmarks,
            descriptor: Descriptor::new(vec![0.0; 128]),
        }
    }

    #[test]
    fn test_absent_detection_is_no_face() {
        let n = GeometryNormalizer::default();
        assert_eq!(n.normalize(None), Err(Rejection::NoFace));
    }

    #[test]
    fn test_tilt_ratio_above_limit_rejected() {
        // diff 10, distance 50 → ratio 0.2
        let det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(150.0, 110.0),
        ));
        let err = GeometryNormalizer::default().normalize(Some(&det)).unwrap_err();
        assert!(matches!(err, Rejection::NotFrontal { .. }));
    }

    #[test]
    fn test_tilt_ratio_within_limit_accepted() {
        // diff 5, distance 50 → ratio 0.1
        let det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(150.0, 105.0),
        ));
        let pose = GeometryNormalizer::default().normalize(Some(&det)).unwrap();
        assert_eq!(pose.x(), 100.0);
        assert_eq!(pose.y(), 80.0);
        assert_eq!(pose.width(), 120.0);
        assert_eq!(pose.height(), 140.0);
        assert_eq!(pose.landmarks().len(), 68);
    }

    #[test]
    fn test_tilt_ratio_exactly_at_limit_accepted() {
        // diff 7.5, distance 50 → ratio 0.15
        let det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(150.0, 107.5),
        ));
        assert!(GeometryNormalizer::default().normalize(Some(&det)).is_ok());
    }

    #[test]
    fn test_eye_order_does_not_matter() {
        // Mirrored image: right anchor left of left anchor
        let det = detection(ibug_landmarks(
            Point::new(150.0, 100.0),
            Point::new(100.0, 104.0),
        ));
        assert!(GeometryNormalizer::default().normalize(Some(&det)).is_ok());
    }

    #[test]
    fn test_coincident_eyes_rejected() {
        let det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(100.0, 101.0),
        ));
        assert!(matches!(
            GeometryNormalizer::default().normalize(Some(&det)),
            Err(Rejection::NotFrontal { .. })
        ));
    }

    #[test]
    fn test_short_landmark_list_rejected() {
        let det = detection(vec![Point::default(); 5]);
        assert_eq!(
            GeometryNormalizer::default().normalize(Some(&det)),
            Err(Rejection::MissingLandmarks {
                expected: 43,
                got: 5
            })
        );
    }

    #[test]
    fn test_scrfd_layout_uses_first_two_points() {
        let n = GeometryNormalizer::new(GeometryConfig {
            layout: LandmarkLayout::Scrfd5,
            ..GeometryConfig::default()
        });
        let det = detection(vec![
            Point::new(100.0, 50.0),
            Point::new(140.0, 52.0),
            Point::new(120.0, 70.0),
            Point::new(105.0, 90.0),
            Point::new(135.0, 90.0),
        ]);
        assert!(n.normalize(Some(&det)).is_ok());
    }

    #[test]
    fn test_degenerate_box_rejected() {
        let mut det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(150.0, 100.0),
        ));
        det.bbox.width = 0.0;
        assert_eq!(
            GeometryNormalizer::default().normalize(Some(&det)),
            Err(Rejection::DegenerateBox)
        );
    }

    #[test]
    fn test_low_score_rejected_when_floor_set() {
        let mut det = detection(ibug_landmarks(
            Point::new(100.0, 100.0),
            Point::new(150.0, 100.0),
        ));
        det.score = 0.4;
        let n = GeometryNormalizer::default().with_min_score(0.6);
        assert!(matches!(
            n.normalize(Some(&det)),
            Err(Rejection::LowConfidence { .. })
        ));
        assert!(GeometryNormalizer::default().normalize(Some(&det)).is_ok());
    }
}
