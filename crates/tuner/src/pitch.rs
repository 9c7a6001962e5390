use fretwise_domain::{note_from_frequency, PitchReading};

/// Analysis frame length in samples.
pub const FRAME_SIZE: usize = 4_096;

/// Minimum frame RMS before analysis is attempted. Below this the input
/// is treated as silence.
const RMS_GATE: f32 = 0.01;

/// Detectable range, covering drop tunings up to high-fret harmonics.
const MIN_FREQUENCY: f32 = 60.0;
const MAX_FREQUENCY: f32 = 1_000.0;

/// Minimum autocorrelation peak, relative to zero-lag energy, for a
/// reading to be trusted. Picked noise and fret-hand squeaks fall below.
const CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Time-domain autocorrelation pitch detector. Pure: feed it frames, get
/// readings back; unreliable frames yield `None` rather than a guess.
#[derive(Clone, Copy, Debug)]
pub struct PitchEstimator {
    sample_rate: u32,
}

impl PitchEstimator {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Estimates the fundamental of one frame of mono samples.
    pub fn analyze(&self, frame: &[f32]) -> Option<PitchReading> {
        let rate = self.sample_rate as f32;
        let min_lag = (rate / MAX_FREQUENCY) as usize;
        let max_lag = ((rate / MIN_FREQUENCY) as usize).min(frame.len().saturating_sub(1));
        if frame.is_empty() || min_lag >= max_lag {
            return None;
        }

        let energy: f32 = frame.iter().map(|s| s * s).sum();
        let rms = (energy / frame.len() as f32).sqrt();
        if rms < RMS_GATE {
            return None;
        }

        let correlation = |lag: usize| -> f32 {
            frame
                .iter()
                .zip(&frame[lag..])
                .map(|(a, b)| a * b)
                .sum::<f32>()
        };

        let mut best_lag = 0;
        let mut best_corr = 0.0f32;
        for lag in min_lag..=max_lag {
            let corr = correlation(lag);
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }
        if best_lag == 0 {
            return None;
        }

        let confidence = best_corr / energy;
        if confidence < CONFIDENCE_THRESHOLD {
            return None;
        }

        // Parabolic interpolation around the peak for sub-sample accuracy.
        let refined_lag = if best_lag > min_lag && best_lag < max_lag {
            let y1 = correlation(best_lag - 1);
            let y2 = best_corr;
            let y3 = correlation(best_lag + 1);
            let denom = 2.0 * (2.0 * y2 - y1 - y3);
            if denom.abs() > 1e-12 {
                best_lag as f32 + (y3 - y1) / denom
            } else {
                best_lag as f32
            }
        } else {
            best_lag as f32
        };

        let frequency = rate / refined_lag;
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
            return None;
        }

        let pitch = note_from_frequency(frequency);
        Some(PitchReading {
            frequency,
            note: pitch.note,
            octave: pitch.octave,
            cents: pitch.cents,
            confidence: confidence.min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fretwise_domain::NoteName;

    fn sine_frame(frequency: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
        (0..FRAME_SIZE)
            .map(|i| {
                amplitude
                    * (std::f32::consts::TAU * frequency * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn pure_tones_are_detected_within_one_percent() {
        let estimator = PitchEstimator::new(44_100);
        for target in [82.41f32, 110.0, 196.0, 329.63, 440.0] {
            let reading = estimator
                .analyze(&sine_frame(target, 0.5, 44_100))
                .unwrap_or_else(|| panic!("no reading for {target} Hz"));
            let error = (reading.frequency - target).abs() / target;
            assert!(
                error < 0.01,
                "{target} Hz detected as {} Hz",
                reading.frequency
            );
        }
    }

    #[test]
    fn readings_carry_note_names() {
        let estimator = PitchEstimator::new(44_100);
        let reading = estimator.analyze(&sine_frame(110.0, 0.5, 44_100)).unwrap();
        assert_eq!(reading.note, NoteName::A);
        assert_eq!(reading.octave, 2);
        assert!(reading.cents.abs() <= 10);
    }

    #[test]
    fn silence_and_quiet_signals_are_gated() {
        let estimator = PitchEstimator::new(44_100);
        assert!(estimator.analyze(&vec![0.0; FRAME_SIZE]).is_none());
        // Audible pitch, but under the RMS gate.
        assert!(estimator
            .analyze(&sine_frame(220.0, 0.005, 44_100))
            .is_none());
    }

    #[test]
    fn noise_fails_the_confidence_check() {
        let estimator = PitchEstimator::new(44_100);
        // Deterministic wideband noise.
        let mut state = 0x1234_5678u32;
        let frame: Vec<f32> = (0..FRAME_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        assert!(estimator.analyze(&frame).is_none());
    }

    #[test]
    fn out_of_range_fundamentals_are_rejected() {
        let estimator = PitchEstimator::new(44_100);
        assert!(estimator.analyze(&sine_frame(30.0, 0.5, 44_100)).is_none());
    }
}
