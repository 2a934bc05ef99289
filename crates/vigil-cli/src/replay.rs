//! Recorded-trace replay: a synthetic camera plus a scripted detector.
//!
//! A trace is a JSON document listing, frame by frame, what the face model
//! returned (`null` for no face). Replaying it drives the real pipeline
//! (sampler, normalizer, liveness evaluator, aggregator) without a camera
//! or a model, which makes thresholds easy to tune offline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_core::{Detection, DetectionAdapter, DetectorError, DetectorOptions};
use vigil_hw::{AcquireFailure, CameraBackend, CameraConstraints, Frame, StreamError, VideoStream};

/// Camera failure a trace can ask the synthetic camera to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSignal {
    /// No camera API at all.
    Unsupported,
    PermissionDenied,
    NotFound,
    Busy,
    Overconstrained,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub camera_failure: Option<FailureSignal>,
    pub frames: Vec<Option<Detection>>,
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse trace {}", path.display()))
    }
}

/// Synthetic camera producing mid-grey frames forever.
pub struct ReplayCamera {
    failure: Option<FailureSignal>,
    releases: Arc<AtomicUsize>,
}

impl ReplayCamera {
    pub fn new(failure: Option<FailureSignal>) -> Self {
        Self {
            failure,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of released streams, shared with every stream this camera opens.
    #[cfg(test)]
    pub fn releases(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl CameraBackend for ReplayCamera {
    type Stream = ReplayStream;

    fn probe(&self) -> Result<bool, AcquireFailure> {
        Ok(self.failure != Some(FailureSignal::Unsupported))
    }

    async fn acquire(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<ReplayStream, AcquireFailure> {
        let device = constraints
            .device
            .clone()
            .unwrap_or_else(|| "replay".to_string());
        match self.failure {
            None | Some(FailureSignal::Unsupported) => Ok(ReplayStream {
                width: constraints.ideal_width,
                height: constraints.ideal_height,
                next_seq: 0,
                releases: self.releases.clone(),
            }),
            Some(FailureSignal::PermissionDenied) => Err(AcquireFailure::PermissionDenied(device)),
            Some(FailureSignal::NotFound) => Err(AcquireFailure::NotFound(device)),
            Some(FailureSignal::Busy) => Err(AcquireFailure::Busy(device)),
            Some(FailureSignal::Overconstrained) => Err(AcquireFailure::Overconstrained(format!(
                "{device}: {}x{} unavailable",
                constraints.ideal_width, constraints.ideal_height
            ))),
            Some(FailureSignal::Other) => Err(AcquireFailure::Other(format!(
                "{device}: simulated driver failure"
            ))),
        }
    }
}

pub struct ReplayStream {
    width: u32,
    height: u32,
    next_seq: u64,
    releases: Arc<AtomicUsize>,
}

impl VideoStream for ReplayStream {
    async fn next_frame(&mut self) -> Result<Frame, StreamError> {
        let len = self.width as usize * self.height as usize;
        let frame = Frame::new(vec![128; len], self.width, self.height, self.next_seq);
        self.next_seq += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Detector answering each call with the next recorded detection; no face
/// once the trace runs out.
pub struct ReplayDetector {
    frames: VecDeque<Option<Detection>>,
    calls: usize,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Option<Detection>>) -> Self {
        Self {
            frames: frames.into(),
            calls: 0,
        }
    }

    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl DetectionAdapter for ReplayDetector {
    async fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        _options: &DetectorOptions,
    ) -> Result<Option<Detection>, DetectorError> {
        self.calls += 1;
        if frame.len() != width as usize * height as usize {
            return Err(DetectorError::MalformedFrame(format!(
                "{} bytes for {width}x{height}",
                frame.len()
            )));
        }
        Ok(self.frames.pop_front().flatten())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use vigil_core::{BoundingBox, Descriptor, Detection, Point};

    /// Frontal 68-point detection with a 100×100 box at `(x, y)` and a
    /// 128-d descriptor whose first component is `first`.
    pub fn detection_at(x: f32, y: f32, first: f32) -> Detection {
        let mut landmarks = vec![Point::new(x + 50.0, y + 60.0); 68];
        landmarks[36] = Point::new(x + 30.0, y + 40.0);
        landmarks[42] = Point::new(x + 70.0, y + 40.0);
        let mut descriptor = vec![0.0; 128];
        descriptor[0] = first;
        Detection {
            bbox: BoundingBox {
                x,
                y,
                width: 100.0,
                height: 100.0,
            },
            score: 0.9,
            landmarks,
            descriptor: Descriptor::new(descriptor),
        }
    }
}
