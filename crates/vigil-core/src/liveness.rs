//! Active liveness detection via pose variety and frame-to-frame motion.
//!
//! A photograph held in front of the camera either stays put, or, when it is
//! moved, drags its face through space as a rigid, slowly panning object.
//! A live subject shifts around the frame and changes expression.
//!
//! The evaluator keeps a short history of accepted poses and confirms
//! liveness only when both of these hold:
//!
//! - **Variety:** the face box has occupied at least `liveness_threshold`
//!   distinct quantized positions within the history window.
//! - **Motion:** between the last two observations the box moved by more
//!   than `movement_threshold` of its own size, or some landmark moved by
//!   more than `movement_threshold` pixels.
//!
//! The same `movement_threshold` sets the quantization grid for the variety
//! signal. The evaluator never looks ahead: its verdict for frame *k*
//! depends only on frames `0..=k`.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Static printed photographs, frozen frames on a display.
//! - **Does not block:** Video replay of a moving face, 3D masks.

use crate::types::PoseRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Default fraction of the face box (and pixel delta for landmarks) that
/// counts as movement. Also the quantization step for distinct positions.
pub const DEFAULT_MOVEMENT_THRESHOLD: f32 = 0.05;

/// Default number of distinct quantized positions required.
pub const DEFAULT_LIVENESS_THRESHOLD: usize = 3;

/// Default history window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub movement_threshold: f32,
    pub liveness_threshold: usize,
    pub history_capacity: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Fixed-capacity queue of poses. Pushing onto a full queue evicts the oldest.
#[derive(Debug, Clone)]
pub struct PoseHistory {
    records: VecDeque<PoseRecord>,
    capacity: usize,
}

impl PoseHistory {
    /// A capacity of zero is raised to one so the latest pose is always kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: PoseRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn last(&self) -> Option<&PoseRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoseRecord> {
        self.records.iter()
    }
}

/// Box displacement between two consecutive poses, normalized by the newer
/// pose's width and height.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Movement {
    pub dx: f32,
    pub dy: f32,
}

/// Detailed outcome of one [`LivenessEvaluator::assess`] call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LivenessAssessment {
    /// Whether liveness is confirmed on this observation.
    pub is_live: bool,
    /// Movement relative to the previous pose, if there was one.
    pub movement: Option<Movement>,
    pub has_movement: bool,
    pub has_landmark_change: bool,
    /// Distinct quantized positions currently in the history window.
    pub variety: usize,
    /// History length after this observation.
    pub history_len: usize,
}

/// Bounded-history liveness state machine for one verification attempt.
#[derive(Debug, Clone)]
pub struct LivenessEvaluator {
    config: LivenessConfig,
    history: PoseHistory,
}

impl LivenessEvaluator {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            history: PoseHistory::with_capacity(config.history_capacity),
            config,
        }
    }

    /// Feed one frame's pose. Returns `true` when liveness is confirmed.
    pub fn observe(&mut self, pose: Option<PoseRecord>) -> bool {
        self.assess(pose).is_live
    }

    /// Like [`observe`](Self::observe) but reports every intermediate signal.
    pub fn assess(&mut self, pose: Option<PoseRecord>) -> LivenessAssessment {
        let Some(pose) = pose else {
            return LivenessAssessment {
                variety: self.variety(),
                history_len: self.history.len(),
                ..LivenessAssessment::default()
            };
        };

        let Some(last) = self.history.last() else {
            // First pose is the baseline
            self.history.push(pose);
            return LivenessAssessment {
                variety: self.variety(),
                history_len: self.history.len(),
                ..LivenessAssessment::default()
            };
        };

        let threshold = self.config.movement_threshold;
        let movement = Movement {
            dx: (pose.x() - last.x()).abs() / pose.width(),
            dy: (pose.y() - last.y()).abs() / pose.height(),
        };
        let has_movement = movement.dx > threshold || movement.dy > threshold;

        if pose.landmarks().len() != last.landmarks().len() {
            tracing::debug!(
                current = pose.landmarks().len(),
                previous = last.landmarks().len(),
                "landmark count changed between frames; comparing common prefix"
            );
        }
        let has_landmark_change = pose
            .landmarks()
            .iter()
            .zip(last.landmarks())
            .any(|(cur, prev)| {
                (cur.x - prev.x).abs() > threshold || (cur.y - prev.y).abs() > threshold
            });

        self.history.push(pose);
        let variety = self.variety();
        let is_live =
            variety >= self.config.liveness_threshold && (has_movement || has_landmark_change);

        LivenessAssessment {
            is_live,
            movement: Some(movement),
            has_movement,
            has_landmark_change,
            variety,
            history_len: self.history.len(),
        }
    }

    /// Discard all evidence and start a fresh attempt.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Number of distinct grid cells occupied by the poses in the window.
    pub fn variety(&self) -> usize {
        let step = self.config.movement_threshold;
        self.history
            .iter()
            .map(|p| (quantize(p.x(), step), quantize(p.y(), step)))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn history(&self) -> &PoseHistory {
        &self.history
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}

impl Default for LivenessEvaluator {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

/// Round `value / step` to the nearest integer, halves rounding up.
fn quantize(value: f32, step: f32) -> i64 {
    (f64::from(value) / f64::from(step) + 0.5).floor() as i64
}
