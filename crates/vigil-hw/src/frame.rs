use std::time::Instant;

/// A single captured grayscale frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Row-major 8-bit luma, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture index within one stream, starting at 0.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Mean pixel value in `[0, 255]`. An empty frame reads as black.
    pub fn mean_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&p| u64::from(p)).sum();
        sum as f32 / self.data.len() as f32
    }

    /// True when the frame is too dark to be worth running detection on
    /// (emitter off, lens covered, exposure still settling).
    pub fn is_dark(&self, floor: f32) -> bool {
        self.mean_brightness() < floor
    }
}
