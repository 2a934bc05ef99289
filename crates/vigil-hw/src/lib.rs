//! vigil-hw — camera boundary: session management, frames, paced sampling.
//!
//! Concrete camera drivers live outside this crate and plug in through
//! [`CameraBackend`].

pub mod camera;
pub mod frame;
pub mod sampler;

pub use camera::{
    AcquireFailure, CameraBackend, CameraConstraints, CameraError, CameraHandle,
    CameraSessionManager, Facing, StreamError, VideoStream,
};
pub use frame::Frame;
pub use sampler::{FrameSampler, SamplerConfig};
