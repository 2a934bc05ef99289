//! Boundary to the opaque face model.
//!
//! The model is injected as a [`DetectionAdapter`]; nothing in this crate
//! depends on a particular detection, landmark or descriptor implementation.

use crate::types::Detection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Options handed to the model on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// Square input size the model resizes frames to.
    pub input_size: u32,
    /// Minimum detector score for a face to be considered at all.
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: 320,
            score_threshold: 0.6,
        }
    }
}

/// Single-face detection capability.
///
/// `Ok(None)` means "no face in this frame" and is the expected answer for
/// most frames. Errors are reserved for frames the model cannot read; the
/// pipeline absorbs them and treats them exactly like `Ok(None)`.
#[allow(async_fn_in_trait)]
pub trait DetectionAdapter {
    async fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        options: &DetectorOptions,
    ) -> Result<Option<Detection>, DetectorError>;
}

/// Run `adapter` and fold an adapter failure into "no face".
pub async fn detect_or_none<D: DetectionAdapter>(
    adapter: &mut D,
    frame: &[u8],
    width: u32,
    height: u32,
    options: &DetectorOptions,
) -> Option<Detection> {
    match adapter.detect(frame, width, height, options).await {
        Ok(detection) => detection,
        Err(e) => {
            tracing::debug!(error = %e, width, height, "detector failed; treating frame as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Descriptor};

    struct Failing;

    impl DetectionAdapter for Failing {
        async fn detect(
            &mut self,
            _frame: &[u8],
            _width: u32,
            _height: u32,
            _options: &DetectorOptions,
        ) -> Result<Option<Detection>, DetectorError> {
            Err(DetectorError::MalformedFrame("truncated buffer".into()))
        }
    }

    struct Fixed(Detection);

    impl DetectionAdapter for Fixed {
        async fn detect(
            &mut self,
            _frame: &[u8],
            _width: u32,
            _height: u32,
            _options: &DetectorOptions,
        ) -> Result<Option<Detection>, DetectorError> {
            Ok(Some(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn test_adapter_error_becomes_none() {
        let got = detect_or_none(&mut Failing, &[], 0, 0, &DetectorOptions::default()).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_adapter_result_passes_through() {
        let det = Detection {
            bbox: BoundingBox {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
            },
            score: 0.9,
            landmarks: vec![],
            descriptor: Descriptor::new(vec![0.1]),
        };
        let got = detect_or_none(
            &mut Fixed(det.clone()),
            &[0; 4],
            2,
            2,
            &DetectorOptions::default(),
        )
        .await;
        assert_eq!(got, Some(det));
    }

    #[test]
    fn test_default_options() {
        let opts = DetectorOptions::default();
        assert_eq!(opts.input_size, 320);
        assert!((opts.score_threshold - 0.6).abs() < 1e-6);
    }
}
