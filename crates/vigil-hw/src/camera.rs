//! Camera session management.
//!
//! Backends report acquisition failures as [`AcquireFailure`] signals. The
//! session manager folds them into the stable [`CameraError`] taxonomy that
//! callers show to the user. A [`CameraHandle`] releases its stream when it
//! is closed or dropped, whichever comes first.

use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    User,
    Environment,
}

/// What the caller asks of the camera. Sizes are preferences, not demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    /// Explicit device (e.g. `/dev/video2`); `None` lets the backend choose.
    pub device: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing: Facing,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device: None,
            ideal_width: 640,
            ideal_height: 480,
            facing: Facing::User,
        }
    }
}

/// Raw failure signal from a camera backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireFailure {
    #[error("camera API missing: {0}")]
    ApiMissing(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("constraints not satisfiable: {0}")]
    Overconstrained(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for AcquireFailure {
    /// Classify an error from opening or configuring a device node.
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => return Self::PermissionDenied(message),
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                return Self::NotFound(message)
            }
            Some(libc::EBUSY) => return Self::Busy(message),
            Some(libc::EINVAL) | Some(libc::ERANGE) => return Self::Overconstrained(message),
            Some(libc::ENOSYS) | Some(libc::ENOTTY) => return Self::ApiMissing(message),
            _ => {}
        }
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            io::ErrorKind::NotFound => Self::NotFound(message),
            io::ErrorKind::InvalidInput => Self::Overconstrained(message),
            io::ErrorKind::Unsupported => Self::ApiMissing(message),
            _ => Self::Other(message),
        }
    }
}

/// Session-fatal camera failure, phrased for the end user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera access is not supported on this device")]
    Unsupported,
    #[error("camera access denied; allow camera access to use face verification")]
    PermissionDenied,
    #[error("no camera found on this device")]
    NoDevice,
    #[error("camera is already in use by another application")]
    DeviceBusy,
    #[error("camera does not meet the required constraints")]
    ConstraintUnsatisfiable,
    #[error("camera error: {0}")]
    Unknown(String),
}

impl From<AcquireFailure> for CameraError {
    fn from(failure: AcquireFailure) -> Self {
        match failure {
            AcquireFailure::ApiMissing(_) => CameraError::Unsupported,
            AcquireFailure::PermissionDenied(_) => CameraError::PermissionDenied,
            AcquireFailure::NotFound(_) => CameraError::NoDevice,
            AcquireFailure::Busy(_) => CameraError::DeviceBusy,
            AcquireFailure::Overconstrained(_) => CameraError::ConstraintUnsatisfiable,
            AcquireFailure::Other(message) => CameraError::Unknown(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("camera handle is closed")]
    Closed,
    #[error("video stream ended")]
    Ended,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A live video stream obtained from a [`CameraBackend`].
#[allow(async_fn_in_trait)]
pub trait VideoStream {
    /// Wait for the next frame, in capture order.
    async fn next_frame(&mut self) -> Result<Frame, StreamError>;

    /// Stop the stream and give the device back. Called at most once.
    fn release(&mut self);
}

/// Platform camera capability.
#[allow(async_fn_in_trait)]
pub trait CameraBackend {
    type Stream: VideoStream;

    /// Whether the platform exposes a camera API at all. An `Err` means the
    /// probe itself could not run.
    fn probe(&self) -> Result<bool, AcquireFailure>;

    async fn acquire(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<Self::Stream, AcquireFailure>;
}

/// Exclusive ownership of an open stream.
pub struct CameraHandle<S: VideoStream> {
    stream: Option<S>,
    label: String,
}

impl<S: VideoStream> CameraHandle<S> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_mut(&mut self) -> Result<&mut S, StreamError> {
        self.stream.as_mut().ok_or(StreamError::Closed)
    }

    /// Release the stream. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            tracing::info!(camera = %self.label, "camera released");
        }
    }
}

impl<S: VideoStream> Drop for CameraHandle<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens and closes camera sessions on a backend.
pub struct CameraSessionManager<B: CameraBackend> {
    backend: B,
}

impl<B: CameraBackend> CameraSessionManager<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Acquire a camera matching `constraints`.
    pub async fn open(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<CameraHandle<B::Stream>, CameraError> {
        match self.backend.probe() {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("camera capability check failed");
                return Err(CameraError::Unsupported);
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "camera capability probe failed");
                return Err(failure.into());
            }
        }

        let stream = self.backend.acquire(constraints).await.map_err(|failure| {
            tracing::warn!(error = %failure, "camera acquisition failed");
            CameraError::from(failure)
        })?;

        let label = constraints
            .device
            .clone()
            .unwrap_or_else(|| format!("default ({:?})", constraints.facing).to_lowercase());
        tracing::info!(
            camera = %label,
            width = constraints.ideal_width,
            height = constraints.ideal_height,
            "camera opened"
        );

        Ok(CameraHandle {
            stream: Some(stream),
            label,
        })
    }

    /// Release `handle`. Idempotent.
    pub fn close(&self, handle: &mut CameraHandle<B::Stream>) {
        handle.close();
    }
}
