//! The render graph. Application code never touches these types directly:
//! it sends [`RenderCommand`]s over a bounded queue, and the renderer
//! (running on the output device's callback thread) drains the queue at
//! block start and executes every event sample-accurately.

pub(crate) mod compressor;
pub mod envelope;
pub(crate) mod param;
pub mod voice;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use fretwise_domain::ChannelId;

use crate::clock::AudioClock;
use crate::render::compressor::Compressor;
use crate::render::param::SmoothedParam;
use crate::render::voice::{RenderVoice, VoiceId, VoiceSpec};

/// How a gain change is applied.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Ramp {
    /// Immediate assignment.
    Step,
    /// One-pole smoothing with the given time constant in seconds.
    Smooth { time_constant: f32 },
    /// Linear ramp over the given duration in seconds.
    Linear { duration: f64 },
}

pub(crate) enum RenderCommand {
    CreateChannel { id: ChannelId, gain: f32 },
    SetChannelGain { id: ChannelId, target: f32, ramp: Ramp },
    SetMasterGain { target: f32, ramp: Ramp },
    StartVoice(Box<VoiceSpec>),
    StopVoice { id: VoiceId },
    StopAll,
}

/// Read-only view of the analyser stage at the end of the master chain.
/// The renderer publishes block RMS and peak levels; UI layers poll them.
#[derive(Clone, Debug, Default)]
pub struct AnalyserTap {
    inner: Arc<AnalyserShared>,
}

#[derive(Debug, Default)]
struct AnalyserShared {
    rms: AtomicU32,
    peak: AtomicU32,
}

impl AnalyserTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.inner.rms.load(Ordering::Acquire))
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.inner.peak.load(Ordering::Acquire))
    }

    fn publish(&self, rms: f32, peak: f32) {
        self.inner.rms.store(rms.to_bits(), Ordering::Release);
        self.inner.peak.store(peak.to_bits(), Ordering::Release);
    }
}

/// Owns all audio-rate state: channel gains, the master chain, and the
/// live voice set. Lives on the render thread after the backend opens.
pub struct Renderer {
    commands: Receiver<RenderCommand>,
    clock: Arc<AudioClock>,
    sample_rate: u32,
    channels: [Option<SmoothedParam>; ChannelId::ALL.len()],
    master: SmoothedParam,
    compressor: Compressor,
    analyser: AnalyserTap,
    voices: Vec<RenderVoice>,
}

/// Voices are bounded to keep per-block work predictable; the playback bus
/// never comes close to this in practice.
const MAX_VOICES: usize = 64;

impl Renderer {
    pub(crate) fn new(
        commands: Receiver<RenderCommand>,
        clock: Arc<AudioClock>,
        analyser: AnalyserTap,
        master_gain: f32,
    ) -> Self {
        let sample_rate = clock.sample_rate();
        Self {
            commands,
            clock,
            sample_rate,
            channels: Default::default(),
            master: SmoothedParam::new(master_gain),
            compressor: Compressor::new(sample_rate),
            analyser,
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    fn handle(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::CreateChannel { id, gain } => {
                // Re-creating a channel replaces it; last write wins.
                self.channels[id as usize] = Some(SmoothedParam::new(gain));
            }
            RenderCommand::SetChannelGain { id, target, ramp } => {
                if let Some(param) = self.channels[id as usize].as_mut() {
                    Self::apply_ramp(param, target, ramp, self.sample_rate);
                }
            }
            RenderCommand::SetMasterGain { target, ramp } => {
                Self::apply_ramp(&mut self.master, target, ramp, self.sample_rate);
            }
            RenderCommand::StartVoice(spec) => {
                if self.voices.len() < MAX_VOICES {
                    self.voices
                        .push(RenderVoice::from_spec(*spec, self.sample_rate));
                }
            }
            RenderCommand::StopVoice { id } => {
                // Already-finished voices are simply absent; ignore.
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                    voice.stop();
                }
            }
            RenderCommand::StopAll => {
                self.voices.clear();
            }
        }
    }

    fn apply_ramp(param: &mut SmoothedParam, target: f32, ramp: Ramp, sample_rate: u32) {
        match ramp {
            Ramp::Step => param.set(target),
            Ramp::Smooth { time_constant } => param.set_target(target, time_constant, sample_rate),
            Ramp::Linear { duration } => param.linear_ramp_to(target, duration, sample_rate),
        }
    }

    /// Renders one mono block and advances the clock by its length.
    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }

        let base_frame = self.clock.frames();
        let mut sum_squares = 0.0f32;
        let mut peak = 0.0f32;

        for (i, slot) in out.iter_mut().enumerate() {
            let frame = base_frame + i as u64;
            let mut channel_acc = [0.0f32; ChannelId::ALL.len()];
            for voice in &mut self.voices {
                channel_acc[voice.channel as usize] += voice.sample(frame, self.sample_rate);
            }

            let mut mix = 0.0f32;
            for id in ChannelId::ALL {
                if let Some(param) = self.channels[id as usize].as_mut() {
                    mix += channel_acc[id as usize] * param.next();
                }
            }

            mix *= self.master.next();
            mix = self.compressor.process(mix);

            sum_squares += mix * mix;
            peak = peak.max(mix.abs());
            *slot = mix;
        }

        if !out.is_empty() {
            self.analyser
                .publish((sum_squares / out.len() as f32).sqrt(), peak);
        }
        self.voices.retain(|voice| !voice.is_finished());
        self.clock.advance(out.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::voice::{SourceSpec, Waveform};
    use crossbeam_channel::bounded;

    fn renderer_with_channel() -> (crossbeam_channel::Sender<RenderCommand>, Renderer) {
        let (tx, rx) = bounded(64);
        let clock = AudioClock::new(44_100);
        let renderer = Renderer::new(rx, clock, AnalyserTap::new(), 1.0);
        tx.send(RenderCommand::CreateChannel {
            id: ChannelId::Metronome,
            gain: 1.0,
        })
        .unwrap();
        (tx, renderer)
    }

    fn osc_voice(id: VoiceId, start: f64) -> RenderCommand {
        RenderCommand::StartVoice(Box::new(VoiceSpec {
            id,
            channel: ChannelId::Metronome,
            source: SourceSpec::Oscillator {
                frequency: 440.0,
                wave: Waveform::Sine,
            },
            gain: 1.0,
            envelope: None,
            start_time: start,
            duration: Some(1.0),
            offset: 0.0,
        }))
    }

    #[test]
    fn voices_start_exactly_at_their_scheduled_frame() {
        let (tx, mut renderer) = renderer_with_channel();
        // Start half a block in: frame 256 of a 512-frame block.
        tx.send(osc_voice(1, 256.0 / 44_100.0)).unwrap();
        let mut block = vec![0.0f32; 512];
        renderer.render(&mut block);
        assert!(block[..256].iter().all(|s| *s == 0.0));
        assert!(block[256..].iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn stop_all_clears_every_voice() {
        let (tx, mut renderer) = renderer_with_channel();
        tx.send(osc_voice(1, 0.0)).unwrap();
        tx.send(osc_voice(2, 0.0)).unwrap();
        let mut block = vec![0.0f32; 128];
        renderer.render(&mut block);
        assert!(block.iter().any(|s| s.abs() > 0.0));

        tx.send(RenderCommand::StopAll).unwrap();
        renderer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn uncreated_channels_contribute_nothing() {
        let (tx, rx) = bounded(8);
        let mut renderer = Renderer::new(rx, AudioClock::new(44_100), AnalyserTap::new(), 1.0);
        tx.send(osc_voice(1, 0.0)).unwrap();
        let mut block = vec![0.0f32; 64];
        renderer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn analyser_tracks_signal_level() {
        let (tx, mut renderer) = renderer_with_channel();
        let tap = renderer.analyser.clone();
        tx.send(osc_voice(1, 0.0)).unwrap();
        let mut block = vec![0.0f32; 512];
        renderer.render(&mut block);
        assert!(tap.rms() > 0.0);
        assert!(tap.peak() >= tap.rms());
    }

    #[test]
    fn clock_advances_per_block() {
        let (_tx, mut renderer) = renderer_with_channel();
        let clock = renderer.clock.clone();
        let mut block = vec![0.0f32; 441];
        renderer.render(&mut block);
        assert_eq!(clock.frames(), 441);
    }
}
