//! Paced frame pulling from an open camera handle.

use crate::camera::{CameraHandle, StreamError, VideoStream};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Minimum spacing between yielded frames. Zero disables pacing.
    pub frame_interval_ms: u64,
    /// Frames discarded right after the stream starts (AGC/AE settling).
    pub warmup_frames: usize,
    /// Mean brightness below which a frame is skipped. Zero disables the check.
    pub dark_floor: f32,
    /// Consecutive dark frames skipped before one is handed out anyway.
    pub max_dark_skips: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            warmup_frames: 4,
            dark_floor: 8.0,
            max_dark_skips: 10,
        }
    }
}

/// Pulls frames from a [`CameraHandle`] at a controlled cadence.
///
/// Frames come out in capture order. The sampler borrows the handle, so the
/// camera cannot be closed underneath it.
pub struct FrameSampler<'a, S: VideoStream> {
    handle: &'a mut CameraHandle<S>,
    config: SamplerConfig,
    ticker: Option<Interval>,
    warmed_up: bool,
    yielded: u64,
    dark_skipped: usize,
}

impl<'a, S: VideoStream> FrameSampler<'a, S> {
    pub fn new(handle: &'a mut CameraHandle<S>, config: SamplerConfig) -> Self {
        Self {
            handle,
            config,
            ticker: None,
            warmed_up: false,
            yielded: 0,
            dark_skipped: 0,
        }
    }

    /// Frames handed out so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Dark frames skipped so far.
    pub fn dark_skipped(&self) -> usize {
        self.dark_skipped
    }

    /// Wait for the next usable frame.
    pub async fn next(&mut self) -> Result<Frame, StreamError> {
        if !self.warmed_up {
            self.warm_up().await?;
        }

        let mut consecutive_dark = 0usize;
        loop {
            self.pace().await;
            let frame = self.handle.stream_mut()?.next_frame().await?;

            if self.config.dark_floor > 0.0
                && frame.is_dark(self.config.dark_floor)
                && consecutive_dark < self.config.max_dark_skips
            {
                consecutive_dark += 1;
                self.dark_skipped += 1;
                tracing::debug!(
                    sequence = frame.sequence,
                    brightness = frame.mean_brightness(),
                    "skipping dark frame"
                );
                continue;
            }

            self.yielded += 1;
            return Ok(frame);
        }
    }

    async fn warm_up(&mut self) -> Result<(), StreamError> {
        self.warmed_up = true;
        if self.config.warmup_frames == 0 {
            return Ok(());
        }
        tracing::debug!(count = self.config.warmup_frames, "discarding warmup frames");
        let stream = self.handle.stream_mut()?;
        for _ in 0..self.config.warmup_frames {
            match stream.next_frame().await {
                Ok(_) => {}
                Err(StreamError::Ended) => return Err(StreamError::Ended),
                Err(e) => tracing::debug!(error = %e, "warmup frame failed"),
            }
        }
        Ok(())
    }

    async fn pace(&mut self) {
        if self.config.frame_interval_ms == 0 {
            return;
        }
        let period = Duration::from_millis(self.config.frame_interval_ms);
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AcquireFailure, CameraBackend, CameraConstraints, CameraSessionManager};
    use std::collections::VecDeque;

    /// Yields frames of the given brightness values, then ends.
    struct Scripted {
        levels: VecDeque<u8>,
        next_seq: u64,
    }

    impl VideoStream for Scripted {
        async fn next_frame(&mut self) -> Result<Frame, StreamError> {
            let level = self.levels.pop_front().ok_or(StreamError::Ended)?;
            let frame = Frame::new(vec![level; 16], 4, 4, self.next_seq);
            self.next_seq += 1;
            Ok(frame)
        }

        fn release(&mut self) {}
    }

    struct Backend(Vec<u8>);

    impl CameraBackend for Backend {
        type Stream = Scripted;

        fn probe(&self) -> Result<bool, AcquireFailure> {
            Ok(true)
        }

        async fn acquire(&mut self, _c: &CameraConstraints) -> Result<Scripted, AcquireFailure> {
            Ok(Scripted {
                levels: self.0.iter().copied().collect(),
                next_seq: 0,
            })
        }
    }

    async fn open(levels: Vec<u8>) -> CameraHandle<Scripted> {
        CameraSessionManager::new(Backend(levels))
            .open(&CameraConstraints::default())
            .await
            .unwrap()
    }

    fn unpaced(warmup_frames: usize) -> SamplerConfig {
        SamplerConfig {
            frame_interval_ms: 0,
            warmup_frames,
            ..SamplerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_warmup_frames_discarded() {
        let mut handle = open(vec![100; 6]).await;
        let mut sampler = FrameSampler::new(&mut handle, unpaced(4));
        assert_eq!(sampler.next().await.unwrap().sequence, 4);
        assert_eq!(sampler.next().await.unwrap().sequence, 5);
        assert!(matches!(sampler.next().await, Err(StreamError::Ended)));
        assert_eq!(sampler.yielded(), 2);
    }

    #[tokio::test]
    async fn test_frames_in_capture_order() {
        let mut handle = open(vec![100; 5]).await;
        let mut sampler = FrameSampler::new(&mut handle, unpaced(0));
        let mut seqs = Vec::new();
        while let Ok(frame) = sampler.next().await {
            seqs.push(frame.sequence);
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_dark_frames_skipped() {
        let mut handle = open(vec![0, 0, 120, 0, 130]).await;
        let mut sampler = FrameSampler::new(&mut handle, unpaced(0));
        assert_eq!(sampler.next().await.unwrap().sequence, 2);
        assert_eq!(sampler.next().await.unwrap().sequence, 4);
        assert_eq!(sampler.dark_skipped(), 3);
    }

    #[tokio::test]
    async fn test_dark_skips_are_bounded() {
        let mut handle = open(vec![0; 5]).await;
        let mut sampler = FrameSampler::new(
            &mut handle,
            SamplerConfig {
                max_dark_skips: 2,
                ..unpaced(0)
            },
        );
        assert_eq!(sampler.next().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_closed_handle_errors() {
        let mut handle = open(vec![100; 5]).await;
        handle.close();
        let mut sampler = FrameSampler::new(&mut handle, unpaced(0));
        assert!(matches!(sampler.next().await, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn test_paced_sampling_yields_frames() {
        let mut handle = open(vec![100; 3]).await;
        let mut sampler = FrameSampler::new(
            &mut handle,
            SamplerConfig {
                frame_interval_ms: 1,
                ..unpaced(0)
            },
        );
        assert_eq!(sampler.next().await.unwrap().sequence, 0);
        assert_eq!(sampler.next().await.unwrap().sequence, 1);
    }
}
