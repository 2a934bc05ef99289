use serde::{Deserialize, Serialize};

/// A 2-D point in working-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face bounding box, pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One raw result from the face model: box, landmarks and identity descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    #[serde(default = "default_score")]
    pub score: f32,
    pub landmarks: Vec<Point>,
    pub descriptor: Descriptor,
}

fn default_score() -> f32 {
    1.0
}

/// Fixed-length identity vector produced by the face model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Component-wise arithmetic mean of `samples`.
    ///
    /// Returns `None` for an empty slice or when the samples disagree on
    /// length. An empty buffer never collapses into a zero vector.
    pub fn mean(samples: &[Descriptor]) -> Option<Descriptor> {
        let first = samples.first()?;
        let dim = first.len();
        if samples.iter().any(|s| s.len() != dim) {
            return None;
        }

        let mut sums = vec![0.0f64; dim];
        for sample in samples {
            for (sum, v) in sums.iter_mut().zip(&sample.values) {
                *sum += f64::from(*v);
            }
        }

        let n = samples.len() as f64;
        Some(Descriptor::new(
            sums.into_iter().map(|s| (s / n) as f32).collect(),
        ))
    }

    /// Euclidean (L2) distance to `other`. `None` on a length mismatch.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Option<f32> {
        if self.len() != other.len() {
            return None;
        }
        let sum: f32 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Frame-independent pose of an accepted face: its box plus every landmark.
///
/// Only constructed through [`PoseRecord::new`], which guarantees a
/// strictly positive width and height.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRecord {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    landmarks: Vec<Point>,
}

impl PoseRecord {
    /// Returns `None` when the box is degenerate (non-positive or non-finite size).
    pub fn new(bbox: BoundingBox, landmarks: Vec<Point>) -> Option<Self> {
        let sized = |v: f32| v.is_finite() && v > 0.0;
        if !sized(bbox.width) || !sized(bbox.height) || !bbox.x.is_finite() || !bbox.y.is_finite()
        {
            return None;
        }
        Some(Self {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
            landmarks,
        })
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn landmarks(&self) -> &[Point] {
        &self.landmarks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_pose_record_rejects_degenerate_box() {
        assert!(PoseRecord::new(bbox(0.0, 0.0, 0.0, 10.0), vec![]).is_none());
        assert!(PoseRecord::new(bbox(0.0, 0.0, 10.0, -1.0), vec![]).is_none());
        assert!(PoseRecord::new(bbox(f32::NAN, 0.0, 10.0, 10.0), vec![]).is_none());
        assert!(PoseRecord::new(bbox(5.0, 6.0, 10.0, 10.0), vec![]).is_some());
    }

    #[test]
    fn test_mean_of_empty_is_none() {
        assert!(Descriptor::mean(&[]).is_none());
    }

    #[test]
    fn test_mean_rejects_mixed_lengths() {
        let samples = vec![
            Descriptor::new(vec![1.0, 2.0]),
            Descriptor::new(vec![1.0, 2.0, 3.0]),
        ];
        assert!(Descriptor::mean(&samples).is_none());
    }

    #[test]
    fn test_mean_is_component_wise() {
        let samples = vec![
            Descriptor::new(vec![1.0, 0.0, -2.0]),
            Descriptor::new(vec![3.0, 0.0, 2.0]),
            Descriptor::new(vec![5.0, 0.0, 6.0]),
        ];
        let mean = Descriptor::mean(&samples).unwrap();
        assert_eq!(mean.len(), 3);
        assert!((mean.values[0] - 3.0).abs() < 1e-6);
        assert!(mean.values[1].abs() < 1e-6);
        assert!((mean.values[2] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
        assert!(a.euclidean_distance(&Descriptor::new(vec![1.0])).is_none());
    }

    #[test]
    fn test_detection_deserializes_point_pairs() {
        let json = r#"{
            "box": {"x": 10, "y": 20, "width": 100, "height": 120},
            "landmarks": [[1.0, 2.0], [3.0, 4.0]],
            "descriptor": [0.5, 0.25]
        }"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bbox.width, 100.0);
        assert_eq!(det.landmarks[1], Point::new(3.0, 4.0));
        assert_eq!(det.descriptor.len(), 2);
        assert_eq!(det.score, 1.0);
    }
}
