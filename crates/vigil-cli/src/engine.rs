use crate::config::Config;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use uuid::Uuid;
use vigil_core::{
    detect_or_none, Descriptor, DescriptorAggregator, DescriptorSource, DetectionAdapter,
    DetectorOptions, GeometryNormalizer, LivenessEvaluator, PoseRecord,
};
use vigil_hw::{
    CameraBackend, CameraError, CameraHandle, CameraSessionManager, FrameSampler, StreamError,
    VideoStream,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("video stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("verification timed out after {0}s")]
    Timeout(u64),
    #[error("failed to start engine: {0}")]
    Startup(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub attempt_id: Uuid,
    pub confirmed_live: bool,
    /// Averaged descriptor; absent unless liveness was confirmed and at least
    /// one usable sample was collected afterwards.
    pub descriptor: Option<Descriptor>,
    /// Frames examined by the liveness evaluator.
    pub frames_observed: usize,
    /// Samples that went into the descriptor.
    pub samples: usize,
}

/// Frames → detections → poses, for one attempt.
struct Pipeline<'a, S: VideoStream, D: DetectionAdapter> {
    sampler: FrameSampler<'a, S>,
    detector: &'a mut D,
    normalizer: &'a GeometryNormalizer,
    options: DetectorOptions,
    stream_error: Option<StreamError>,
}

impl<'a, S: VideoStream, D: DetectionAdapter> Pipeline<'a, S, D> {
    /// Pull one frame and run it through detection and the frontal gate.
    /// `Ok(None)` means no usable face in this frame.
    async fn observe_frame(&mut self) -> Result<Option<(PoseRecord, Descriptor)>, StreamError> {
        let frame = self.sampler.next().await?;
        let detection = detect_or_none(
            &mut *self.detector,
            &frame.data,
            frame.width,
            frame.height,
            &self.options,
        )
        .await;

        match self.normalizer.normalize(detection.as_ref()) {
            Ok(pose) => {
                let descriptor = detection.map(|d| d.descriptor).unwrap_or_default();
                Ok(Some((pose, descriptor)))
            }
            Err(rejection) => {
                tracing::debug!(sequence = frame.sequence, reason = %rejection, "frame rejected");
                Ok(None)
            }
        }
    }
}

impl<'a, S: VideoStream, D: DetectionAdapter> DescriptorSource for Pipeline<'a, S, D> {
    async fn acquire(&mut self) -> Option<Descriptor> {
        if self.stream_error.is_some() {
            return None;
        }
        match self.observe_frame().await {
            Ok(observation) => observation.map(|(_, descriptor)| descriptor),
            Err(e) => {
                tracing::warn!(error = %e, "stream failed during descriptor sampling");
                self.stream_error = Some(e);
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.stream_error.is_some()
    }
}

/// Run one complete verification attempt: open the camera, wait for
/// liveness, then average descriptors. The camera is released on every path.
pub async fn run_attempt<B: CameraBackend, D: DetectionAdapter>(
    sessions: &mut CameraSessionManager<B>,
    detector: &mut D,
    config: &Config,
) -> Result<VerificationResult, EngineError> {
    let attempt_id = Uuid::new_v4();
    let span = tracing::info_span!("verify", attempt = %attempt_id);
    attempt(sessions, detector, config, attempt_id)
        .instrument(span)
        .await
}

async fn attempt<B: CameraBackend, D: DetectionAdapter>(
    sessions: &mut CameraSessionManager<B>,
    detector: &mut D,
    config: &Config,
    attempt_id: Uuid,
) -> Result<VerificationResult, EngineError> {
    let mut handle = sessions.open(&config.camera).await?;
    let result = verify_on(&mut handle, detector, config, attempt_id).await;
    sessions.close(&mut handle);
    result
}

async fn verify_on<S: VideoStream, D: DetectionAdapter>(
    handle: &mut CameraHandle<S>,
    detector: &mut D,
    config: &Config,
    attempt_id: Uuid,
) -> Result<VerificationResult, EngineError> {
    let normalizer = GeometryNormalizer::new(config.geometry)
        .with_min_score(config.detector.score_threshold);
    let mut pipeline = Pipeline {
        sampler: FrameSampler::new(handle, config.sampler),
        detector,
        normalizer: &normalizer,
        options: config.detector,
        stream_error: None,
    };

    let mut evaluator = LivenessEvaluator::new(config.liveness);
    let mut frames_observed = 0usize;
    let mut confirmed_live = false;

    while frames_observed < config.verify.max_liveness_frames {
        let pose = pipeline.observe_frame().await?.map(|(pose, _)| pose);
        frames_observed += 1;

        let assessment = evaluator.assess(pose);
        tracing::debug!(
            frame = frames_observed,
            variety = assessment.variety,
            has_movement = assessment.has_movement,
            has_landmark_change = assessment.has_landmark_change,
            is_live = assessment.is_live,
            "liveness observation"
        );
        if assessment.is_live {
            confirmed_live = true;
            break;
        }
    }
    evaluator.reset();

    if !confirmed_live {
        tracing::info!(frames = frames_observed, "liveness not confirmed");
        return Ok(VerificationResult {
            attempt_id,
            confirmed_live: false,
            descriptor: None,
            frames_observed,
            samples: 0,
        });
    }
    tracing::info!(frames = frames_observed, "liveness confirmed");

    let aggregation = DescriptorAggregator::new(config.aggregation)
        .run(&mut pipeline)
        .await;
    if let Some(e) = pipeline.stream_error.take() {
        return Err(e.into());
    }

    tracing::info!(
        samples = aggregation.samples,
        attempts = aggregation.attempts,
        descriptor = aggregation.descriptor.is_some(),
        "descriptor aggregation finished"
    );

    Ok(VerificationResult {
        attempt_id,
        confirmed_live: true,
        descriptor: aggregation.descriptor,
        frames_observed,
        samples: aggregation.samples,
    })
}

/// Messages sent from callers to the engine thread.
enum EngineRequest {
    Verify {
        reply: oneshot::Sender<Result<VerificationResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request one verification attempt.
    pub async fn verify(&self) -> Result<VerificationResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the camera backend and the detector and runs each attempt
/// to completion on its own single-threaded runtime, so attempts never
/// overlap. The thread exits once every [`EngineHandle`] is dropped.
pub fn spawn_engine<B, D>(
    backend: B,
    detector: D,
    config: Config,
) -> Result<EngineHandle, EngineError>
where
    B: CameraBackend + Send + 'static,
    D: DetectionAdapter + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(EngineError::Startup)?;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut sessions = CameraSessionManager::new(backend);
    let mut detector = detector;

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { reply } => {
                        let result = runtime.block_on(run_with_timeout(
                            &mut sessions,
                            &mut detector,
                            &config,
                        ));
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "verification failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Startup)?;

    Ok(EngineHandle { tx })
}

async fn run_with_timeout<B: CameraBackend, D: DetectionAdapter>(
    sessions: &mut CameraSessionManager<B>,
    detector: &mut D,
    config: &Config,
) -> Result<VerificationResult, EngineError> {
    let secs = config.verify.timeout_secs;
    if secs == 0 {
        return run_attempt(sessions, detector, config).await;
    }
    // Dropping the attempt on timeout drops its camera handle, which releases the device.
    tokio::time::timeout(Duration::from_secs(secs), run_attempt(sessions, detector, config))
        .await
        .map_err(|_| EngineError::Timeout(secs))?
}
