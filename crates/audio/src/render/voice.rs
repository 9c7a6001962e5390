use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fretwise_domain::ChannelId;

use crate::render::envelope::EnvelopeSpec;
use crate::sample::SampleAsset;

pub type VoiceId = u64;

/// Oscillator waveforms offered by the playback bus.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    #[default]
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// Sample for a normalized phase in [0, 1).
    fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (std::f32::consts::TAU * phase).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

/// What a voice plays.
pub(crate) enum SourceSpec {
    Buffer { asset: Arc<SampleAsset> },
    Oscillator { frequency: f32, wave: Waveform },
}

/// Everything the renderer needs to start a voice. Built exclusively by
/// the playback bus.
pub(crate) struct VoiceSpec {
    pub id: VoiceId,
    pub channel: ChannelId,
    pub source: SourceSpec,
    /// Volume gain × normalization gain, both already clamped upstream.
    pub gain: f32,
    pub envelope: Option<EnvelopeSpec>,
    /// Start time on the audio clock, in seconds.
    pub start_time: f64,
    /// Playback length in seconds. `None` means "to the end of the
    /// buffer"; oscillators always carry an explicit duration.
    pub duration: Option<f64>,
    /// Buffer read offset in seconds; ignored for oscillators.
    pub offset: f64,
}

enum Source {
    Buffer {
        asset: Arc<SampleAsset>,
        /// Fractional read position in source frames.
        position: f64,
        /// Source frames per output frame; off-rate assets resample here.
        step: f64,
    },
    Oscillator {
        phase: f32,
        increment: f32,
        wave: Waveform,
    },
}

/// An active playback unit on the render thread.
pub(crate) struct RenderVoice {
    pub id: VoiceId,
    pub channel: ChannelId,
    source: Source,
    gain: f32,
    envelope: Option<EnvelopeSpec>,
    start_frame: u64,
    end_frame: u64,
    duration_secs: f32,
    finished: bool,
}

impl RenderVoice {
    pub fn from_spec(spec: VoiceSpec, out_rate: u32) -> Self {
        let start_frame = (spec.start_time.max(0.0) * out_rate as f64).round() as u64;

        let (source, duration_secs) = match spec.source {
            SourceSpec::Buffer { asset } => {
                let remaining = (asset.duration as f64 - spec.offset).max(0.0);
                let duration = spec.duration.unwrap_or(remaining).min(remaining);
                let position = spec.offset.max(0.0) * asset.sample_rate as f64;
                let step = asset.sample_rate as f64 / out_rate as f64;
                (
                    Source::Buffer {
                        asset,
                        position,
                        step,
                    },
                    duration as f32,
                )
            }
            SourceSpec::Oscillator { frequency, wave } => {
                let duration = spec.duration.unwrap_or(0.0);
                (
                    Source::Oscillator {
                        phase: 0.0,
                        increment: frequency / out_rate as f32,
                        wave,
                    },
                    duration as f32,
                )
            }
        };

        let end_frame = start_frame + (duration_secs as f64 * out_rate as f64).round() as u64;

        Self {
            id: spec.id,
            channel: spec.channel,
            source,
            gain: spec.gain,
            envelope: spec.envelope,
            start_frame,
            end_frame,
            duration_secs,
            finished: end_frame <= start_frame,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stop(&mut self) {
        self.finished = true;
    }

    /// Contribution of this voice at an absolute frame index. Must be
    /// called once per rendered frame, in order.
    pub fn sample(&mut self, frame: u64, out_rate: u32) -> f32 {
        if self.finished || frame < self.start_frame {
            return 0.0;
        }
        if frame >= self.end_frame {
            self.finished = true;
            return 0.0;
        }

        let raw = match &mut self.source {
            Source::Buffer {
                asset,
                position,
                step,
            } => {
                let index = *position as usize;
                if index >= asset.frames.len() {
                    self.finished = true;
                    return 0.0;
                }
                let frac = (*position - index as f64) as f32;
                let s0 = asset.frames[index];
                let s1 = asset.frames.get(index + 1).copied().unwrap_or(s0);
                *position += *step;
                s0 + (s1 - s0) * frac
            }
            Source::Oscillator {
                phase,
                increment,
                wave,
            } => {
                let sample = wave.sample(*phase);
                *phase += *increment;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
                sample
            }
        };

        let level = match &self.envelope {
            Some(envelope) => {
                let t = (frame - self.start_frame) as f32 / out_rate as f32;
                envelope.level_at(t, self.duration_secs)
            }
            None => 1.0,
        };

        raw * self.gain * level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osc_spec(duration: f64) -> VoiceSpec {
        VoiceSpec {
            id: 1,
            channel: ChannelId::Effects,
            source: SourceSpec::Oscillator {
                frequency: 441.0,
                wave: Waveform::Sine,
            },
            gain: 1.0,
            envelope: None,
            start_time: 0.0,
            duration: Some(duration),
            offset: 0.0,
        }
    }

    #[test]
    fn oscillator_finishes_at_its_stop_frame() {
        let mut voice = RenderVoice::from_spec(osc_spec(0.01), 44_100);
        for frame in 0..440 {
            voice.sample(frame, 44_100);
        }
        assert!(!voice.is_finished());
        voice.sample(441, 44_100);
        assert!(voice.is_finished());
    }

    #[test]
    fn oscillator_produces_signal() {
        let mut voice = RenderVoice::from_spec(osc_spec(0.01), 44_100);
        let peak = (0..400)
            .map(|f| voice.sample(f, 44_100).abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.9);
    }

    #[test]
    fn buffer_voice_respects_offset_and_duration() {
        let asset = Arc::new(SampleAsset::new(
            "test",
            (0..44_100).map(|i| i as f32 / 44_100.0).collect(),
            44_100,
        ));
        let mut voice = RenderVoice::from_spec(
            VoiceSpec {
                id: 2,
                channel: ChannelId::Scales,
                source: SourceSpec::Buffer {
                    asset: asset.clone(),
                },
                gain: 1.0,
                envelope: None,
                start_time: 0.0,
                duration: Some(0.1),
                offset: 0.5,
            },
            44_100,
        );
        // First sample reads from the half-second mark.
        let first = voice.sample(0, 44_100);
        assert!((first - 0.5).abs() < 1e-3);
        for frame in 1..4_409 {
            voice.sample(frame, 44_100);
        }
        assert!(!voice.is_finished());
        voice.sample(4_410, 44_100);
        assert!(voice.is_finished());
    }

    #[test]
    fn voice_waits_for_its_start_frame() {
        let mut voice = RenderVoice::from_spec(
            VoiceSpec {
                start_time: 1.0,
                ..osc_spec(0.5)
            },
            44_100,
        );
        assert_eq!(voice.sample(0, 44_100), 0.0);
        assert!(!voice.is_finished());
    }
}
