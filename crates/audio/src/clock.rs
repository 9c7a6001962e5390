use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic audio clock backed by the renderer's frame counter. All event
/// scheduling is computed against this clock, never the wall clock, so
/// perceived timing is immune to application-thread jitter.
#[derive(Debug)]
pub struct AudioClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            frames: AtomicU64::new(0),
            sample_rate,
        })
    }

    /// Seconds of audio rendered since the stream opened.
    pub fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame index corresponding to a clock time, rounded to the nearest
    /// sample.
    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}
