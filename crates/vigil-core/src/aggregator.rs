//! Multi-sample descriptor averaging.
//!
//! A single descriptor is noisy: lighting, blur and expression all leak into
//! it. Averaging a handful of samples taken a short time apart yields a more
//! stable identity vector. Samples are spaced by a fixed delay to reduce the
//! correlation between consecutive frames.

use crate::types::Descriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of samples to average.
pub const DEFAULT_TARGET_SAMPLES: usize = 3;

/// Default pause between acquisition attempts.
pub const DEFAULT_SAMPLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub target_samples: usize,
    /// Attempt budget. `None` means twice `target_samples`.
    pub max_attempts: Option<usize>,
    pub sample_delay_ms: u64,
    /// Return nothing unless the buffer reached `target_samples`.
    pub require_full_buffer: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            target_samples: DEFAULT_TARGET_SAMPLES,
            max_attempts: None,
            sample_delay_ms: DEFAULT_SAMPLE_DELAY.as_millis() as u64,
            require_full_buffer: false,
        }
    }
}

impl AggregationConfig {
    pub fn effective_max_attempts(&self) -> usize {
        self.max_attempts
            .unwrap_or_else(|| self.target_samples.saturating_mul(2))
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}

/// Something that can be asked for one descriptor at a time.
///
/// `None` is a failed attempt (no usable face in the sampled frame).
#[allow(async_fn_in_trait)]
pub trait DescriptorSource {
    async fn acquire(&mut self) -> Option<Descriptor>;

    /// `true` once the source can never produce another descriptor, e.g.
    /// its video stream ended. The aggregator stops asking and stops waiting.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Finite attempt budget. Yields attempt numbers `1..=max`, then `None`
/// forever; it cannot be rewound.
#[derive(Debug, Clone)]
pub struct SampleAttempts {
    made: usize,
    max: usize,
}

impl SampleAttempts {
    pub fn new(max: usize) -> Self {
        Self { made: 0, max }
    }

    pub fn made(&self) -> usize {
        self.made
    }

    pub fn remaining(&self) -> usize {
        self.max - self.made
    }
}

impl Iterator for SampleAttempts {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.made >= self.max {
            return None;
        }
        self.made += 1;
        Some(self.made)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl std::iter::FusedIterator for SampleAttempts {}

/// Report of one aggregation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Averaged descriptor, absent when no usable sample was collected.
    pub descriptor: Option<Descriptor>,
    pub samples: usize,
    pub attempts: usize,
}

/// Collects descriptor samples and reduces them to their mean.
#[derive(Debug, Clone)]
pub struct DescriptorAggregator {
    config: AggregationConfig,
}

impl DescriptorAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Collect up to `target_samples` descriptors from `source` within the
    /// attempt budget and average them.
    pub async fn collect<S: DescriptorSource>(&self, source: &mut S) -> Option<Descriptor> {
        self.run(source).await.descriptor
    }

    /// Same as [`collect`](Self::collect) with sample and attempt counts.
    pub async fn run<S: DescriptorSource>(&self, source: &mut S) -> Aggregation {
        let target = self.config.target_samples;
        let delay = self.config.sample_delay();
        let mut attempts = SampleAttempts::new(self.config.effective_max_attempts());
        let mut buffer: Vec<Descriptor> = Vec::with_capacity(target);

        while buffer.len() < target {
            if source.is_exhausted() {
                tracing::debug!(attempts = attempts.made(), "descriptor source exhausted");
                break;
            }
            let Some(attempt) = attempts.next() else {
                break;
            };

            match source.acquire().await {
                Some(sample) if sample.is_empty() => {
                    tracing::debug!(attempt, "discarding empty descriptor");
                }
                Some(sample) => match buffer.first().map(Descriptor::len) {
                    Some(expected) if expected != sample.len() => {
                        tracing::warn!(
                            attempt,
                            expected,
                            got = sample.len(),
                            "discarding descriptor with mismatched length"
                        );
                    }
                    _ => buffer.push(sample),
                },
                None => {
                    tracing::debug!(attempt, "no descriptor this attempt");
                }
            }

            if buffer.len() < target
                && attempts.remaining() > 0
                && !delay.is_zero()
                && !source.is_exhausted()
            {
                tokio::time::sleep(delay).await;
            }
        }

        let attempts_made = attempts.made();
        let samples = buffer.len();

        let descriptor = if samples == 0 {
            tracing::info!(attempts = attempts_made, "aggregation exhausted without samples");
            None
        } else if samples < target && self.config.require_full_buffer {
            tracing::info!(
                samples,
                target,
                attempts = attempts_made,
                "aggregation exhausted with an undersized buffer"
            );
            None
        } else {
            Descriptor::mean(&buffer)
        };

        tracing::debug!(samples, attempts = attempts_made, "aggregation finished");

        Aggregation {
            descriptor,
            samples,
            attempts: attempts_made,
        }
    }
}

impl Default for DescriptorAggregator {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}
