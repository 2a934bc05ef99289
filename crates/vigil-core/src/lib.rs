//! vigil-core — liveness verification and descriptor aggregation.
//!
//! Everything here is pure or cooperative-async: no camera, no model, no
//! storage. The face model is injected through [`DetectionAdapter`].

pub mod aggregator;
pub mod detector;
pub mod geometry;
pub mod liveness;
pub mod matcher;
pub mod types;

pub use aggregator::{
    Aggregation, AggregationConfig, DescriptorAggregator, DescriptorSource, SampleAttempts,
};
pub use detector::{detect_or_none, DetectionAdapter, DetectorError, DetectorOptions};
pub use geometry::{GeometryConfig, GeometryNormalizer, LandmarkLayout, Rejection};
pub use liveness::{LivenessAssessment, LivenessConfig, LivenessEvaluator, Movement, PoseHistory};
pub use matcher::{EuclideanMatcher, GalleryEntry, MatchResult, Matcher};
pub use types::{BoundingBox, Descriptor, Detection, Point, PoseRecord};
