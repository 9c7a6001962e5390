use serde::{Deserialize, Serialize};

/// A decoded audio asset: mono PCM at its native sample rate. Immutable
/// once created; the cache hands out `Arc<SampleAsset>` and voices read
/// straight from the shared frames.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleAsset {
    /// Cache key, usually the source URL.
    pub key: String,
    pub frames: Vec<f32>,
    pub sample_rate: u32,
    /// Length in seconds.
    pub duration: f32,
}

impl SampleAsset {
    pub fn new(key: impl Into<String>, frames: Vec<f32>, sample_rate: u32) -> Self {
        let duration = frames.len() as f32 / sample_rate as f32;
        Self {
            key: key.into(),
            frames,
            sample_rate,
            duration,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
