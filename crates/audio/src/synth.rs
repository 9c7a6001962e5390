//! Procedural sample synthesis: pitch-accurate fallbacks that need no
//! network and no recorded assets.

use crate::sample::SampleAsset;

/// Relative strength of the first six harmonics of the synthesized
/// plucked-string tone.
const HARMONIC_AMPLITUDES: [f32; 6] = [1.0, 0.5, 0.25, 0.15, 0.1, 0.05];

/// Synthesizes a plucked-string style note: a harmonic stack shaped by a
/// simple ADSR envelope.
pub fn synthesize_note(frequency: f32, duration: f32, sample_rate: u32) -> SampleAsset {
    let length = (sample_rate as f32 * duration) as usize;
    let mut frames = Vec::with_capacity(length);

    let attack = 0.005_f32;
    let decay = 0.1_f32;
    let sustain = 0.7_f32;
    let release_start = (duration - 0.3).max(attack + decay);

    for i in 0..length {
        let t = i as f32 / sample_rate as f32;

        let envelope = if t < attack {
            t / attack
        } else if t < attack + decay {
            1.0 - (1.0 - sustain) * ((t - attack) / decay)
        } else if t < release_start {
            sustain
        } else {
            sustain * (1.0 - (t - release_start) / (duration - release_start).max(1e-6))
        };

        let mut sample = 0.0;
        for (h, amplitude) in HARMONIC_AMPLITUDES.iter().enumerate() {
            let harmonic = (h + 1) as f32;
            sample += amplitude * (std::f32::consts::TAU * frequency * harmonic * t).sin();
        }

        frames.push(sample * envelope.max(0.0) * 0.3);
    }

    SampleAsset::new(
        format!("synth:note:{frequency}:{duration}"),
        frames,
        sample_rate,
    )
}

/// Synthesizes a metronome click: an exponentially decaying tone with a
/// touch of noise for transient bite.
pub fn synthesize_click(frequency: f32, duration: f32, sample_rate: u32) -> SampleAsset {
    let length = (sample_rate as f32 * duration) as usize;
    let mut frames = Vec::with_capacity(length);
    let mut noise = NoiseState::new(0x2545_F491);

    for i in 0..length {
        let t = i as f32 / sample_rate as f32;
        let envelope = (-t * 50.0).exp();
        let tone = (std::f32::consts::TAU * frequency * t).sin();
        frames.push((tone + noise.next() * 0.1) * envelope * 0.5);
    }

    SampleAsset::new(
        format!("synth:click:{frequency}:{duration}"),
        frames,
        sample_rate,
    )
}

/// xorshift32 noise source; deterministic so synthesized clicks are
/// byte-for-byte reproducible.
struct NoiseState(u32);

impl NoiseState {
    fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    /// Uniform-ish sample in [-1, 1].
    fn next(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_has_expected_length_and_stays_bounded() {
        let asset = synthesize_note(220.0, 1.0, 44_100);
        assert_eq!(asset.frames.len(), 44_100);
        assert!(asset.frames.iter().all(|s| s.abs() <= 1.0));
        assert!((asset.duration - 1.0).abs() < 1e-3);
    }

    #[test]
    fn click_decays_to_silence() {
        let asset = synthesize_click(1000.0, 0.05, 44_100);
        let head: f32 = asset.frames[..200].iter().map(|s| s.abs()).sum();
        let tail: f32 = asset.frames[asset.frames.len() - 200..]
            .iter()
            .map(|s| s.abs())
            .sum();
        assert!(head > tail * 10.0, "click should decay, head={head} tail={tail}");
    }

    #[test]
    fn click_is_deterministic() {
        let a = synthesize_click(800.0, 0.04, 44_100);
        let b = synthesize_click(800.0, 0.04, 44_100);
        assert_eq!(a.frames, b.frames);
    }
}
