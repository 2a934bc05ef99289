use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use vigil_core::matcher::DEFAULT_DISTANCE_THRESHOLD;
use vigil_core::{AggregationConfig, DetectorOptions, GeometryConfig, LivenessConfig};
use vigil_hw::{CameraConstraints, SamplerConfig};

/// Engine configuration: TOML file (optional) overlaid with `VIGIL_*`
/// environment variables. Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConstraints,
    pub sampler: SamplerConfig,
    pub detector: DetectorOptions,
    pub geometry: GeometryConfig,
    pub liveness: LivenessConfig,
    pub aggregation: AggregationConfig,
    pub matching: MatchingConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Maximum Euclidean distance for a positive gallery match.
    pub distance_threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Timeout in seconds for one verification attempt. Zero disables it.
    pub timeout_secs: u64,
    /// Frames examined for liveness before the attempt is abandoned.
    pub max_liveness_frames: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_liveness_frames: 150,
        }
    }
}

impl Config {
    /// Load from `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay `VIGIL_*` variables resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(device) = lookup("VIGIL_CAMERA_DEVICE") {
            self.camera.device = Some(device);
        }
        self.sampler.warmup_frames =
            parse_or(&lookup, "VIGIL_WARMUP_FRAMES", self.sampler.warmup_frames);
        self.sampler.frame_interval_ms =
            parse_or(&lookup, "VIGIL_FRAME_INTERVAL_MS", self.sampler.frame_interval_ms);
        self.detector.score_threshold =
            parse_or(&lookup, "VIGIL_SCORE_THRESHOLD", self.detector.score_threshold);
        self.geometry.max_eye_tilt_ratio =
            parse_or(&lookup, "VIGIL_MAX_EYE_TILT_RATIO", self.geometry.max_eye_tilt_ratio);
        self.liveness.movement_threshold =
            parse_or(&lookup, "VIGIL_MOVEMENT_THRESHOLD", self.liveness.movement_threshold);
        self.liveness.liveness_threshold =
            parse_or(&lookup, "VIGIL_LIVENESS_THRESHOLD", self.liveness.liveness_threshold);
        self.aggregation.target_samples =
            parse_or(&lookup, "VIGIL_TARGET_SAMPLES", self.aggregation.target_samples);
        self.aggregation.sample_delay_ms =
            parse_or(&lookup, "VIGIL_SAMPLE_DELAY_MS", self.aggregation.sample_delay_ms);
        self.matching.distance_threshold = parse_or(
            &lookup,
            "VIGIL_DISTANCE_THRESHOLD",
            self.matching.distance_threshold,
        );
        self.verify.timeout_secs =
            parse_or(&lookup, "VIGIL_VERIFY_TIMEOUT_SECS", self.verify.timeout_secs);
        self.verify.max_liveness_frames = parse_or(
            &lookup,
            "VIGIL_MAX_LIVENESS_FRAMES",
            self.verify.max_liveness_frames,
        );
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.liveness.movement_threshold;
        if !(t.is_finite() && t > 0.0) {
            bail!("liveness.movement_threshold must be a positive number (got {t})");
        }
        if self.liveness.liveness_threshold == 0 {
            bail!("liveness.liveness_threshold must be at least 1");
        }
        if self.liveness.history_capacity < self.liveness.liveness_threshold {
            bail!(
                "liveness.history_capacity ({}) must be at least liveness.liveness_threshold ({})",
                self.liveness.history_capacity,
                self.liveness.liveness_threshold
            );
        }
        if self.aggregation.target_samples == 0 {
            bail!("aggregation.target_samples must be at least 1");
        }
        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            bail!("camera.ideal_width and camera.ideal_height must be non-zero");
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vigil_core::LandmarkLayout;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert!((c.liveness.movement_threshold - 0.05).abs() < 1e-6);
        assert_eq!(c.liveness.liveness_threshold, 3);
        assert_eq!(c.liveness.history_capacity, 10);
        assert_eq!(c.aggregation.target_samples, 3);
        assert_eq!(c.aggregation.sample_delay_ms, 200);
        assert_eq!(c.verify.timeout_secs, 10);
        assert!((c.matching.distance_threshold - 0.4).abs() < 1e-6);
        c.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = Config::from_toml(
            r#"
            [liveness]
            liveness_threshold = 4

            [geometry]
            layout = "scrfd5"

            [camera]
            device = "/dev/video2"
            "#,
        )
        .unwrap();
        assert_eq!(c.liveness.liveness_threshold, 4);
        assert!((c.liveness.movement_threshold - 0.05).abs() < 1e-6);
        assert_eq!(c.geometry.layout, LandmarkLayout::Scrfd5);
        assert_eq!(c.camera.device.as_deref(), Some("/dev/video2"));
        assert_eq!(c.camera.ideal_width, 640);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = Config::default().to_toml().unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.aggregation, Config::default().aggregation);
        assert_eq!(back.camera, Config::default().camera);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VIGIL_CAMERA_DEVICE", "/dev/video0"),
            ("VIGIL_MOVEMENT_THRESHOLD", "0.1"),
            ("VIGIL_TARGET_SAMPLES", "5"),
            ("VIGIL_VERIFY_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut c = Config::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(c.camera.device.as_deref(), Some("/dev/video0"));
        assert!((c.liveness.movement_threshold - 0.1).abs() < 1e-6);
        assert_eq!(c.aggregation.target_samples, 5);
        // Unparseable values fall back to the current setting
        assert_eq!(c.verify.timeout_secs, 10);
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut c = Config::default();
        c.liveness.movement_threshold = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unreachable_variety() {
        let mut c = Config::default();
        c.liveness.history_capacity = 2;
        assert!(c.validate().is_err());
    }
}
