use crate::sample::SampleAsset;

/// Loudness normalization collaborator used by the playback bus for chord
/// samples, so recorded chords of different levels land at a consistent
/// perceived volume.
pub trait LoudnessNormalizer: Send + Sync {
    /// Gain to apply in front of the envelope/volume chain.
    fn gain_for(&self, asset: &SampleAsset) -> f32;
}

/// RMS-targeting normalizer. Gain is capped so quiet room noise in a
/// recording cannot be amplified into distortion.
#[derive(Clone, Copy, Debug)]
pub struct RmsNormalizer {
    pub target_rms: f32,
}

impl Default for RmsNormalizer {
    fn default() -> Self {
        Self { target_rms: 0.1 }
    }
}

impl LoudnessNormalizer for RmsNormalizer {
    fn gain_for(&self, asset: &SampleAsset) -> f32 {
        if asset.frames.is_empty() {
            return 1.0;
        }
        let energy: f32 = asset.frames.iter().map(|s| s * s).sum();
        let rms = (energy / asset.frames.len() as f32).sqrt();
        if rms < 1e-6 {
            return 1.0;
        }
        (self.target_rms / rms).clamp(0.25, 4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn asset_with_level(level: f32) -> SampleAsset {
        SampleAsset::new("test", vec![level; 1000], 44_100)
    }

    #[test]
    fn quiet_assets_are_boosted_loud_assets_attenuated() {
        let normalizer = RmsNormalizer::default();
        assert!(normalizer.gain_for(&asset_with_level(0.05)) > 1.0);
        assert!(normalizer.gain_for(&asset_with_level(0.8)) < 1.0);
    }

    #[test]
    fn gain_is_capped() {
        let normalizer = RmsNormalizer::default();
        assert_relative_eq!(normalizer.gain_for(&asset_with_level(0.001)), 4.0);
        assert_relative_eq!(normalizer.gain_for(&asset_with_level(1.0)), 0.25);
    }

    #[test]
    fn silence_passes_through_unchanged() {
        let normalizer = RmsNormalizer::default();
        assert_relative_eq!(normalizer.gain_for(&asset_with_level(0.0)), 1.0);
    }
}
