use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use fretwise_domain::ChannelId;

use crate::cache::SampleCache;
use crate::context::EngineHandle;
use crate::mixer::{ChannelTable, SignalMixer};
use crate::normalize::{LoudnessNormalizer, RmsNormalizer};
use crate::render::envelope::EnvelopeSpec;
use crate::render::voice::{SourceSpec, VoiceId, VoiceSpec, Waveform};
use crate::render::{Ramp, RenderCommand};
use crate::sample::SampleAsset;

/// Default fade length for [`PlaybackBus::fade_out_all`], in seconds.
pub const DEFAULT_FADE_OUT: f64 = 0.15;

/// Slack added after a fade before voices are cut, in seconds.
const FADE_TAIL: f64 = 0.05;

/// Per-play tuning for buffer playback.
#[derive(Clone, Copy, Debug)]
pub struct PlayOptions {
    /// Linear gain, clamped to [0, 1].
    pub volume: f32,
    /// Audio-clock start time in seconds; `None` plays immediately.
    pub start_time: Option<f64>,
    /// Read offset into the buffer, seconds.
    pub offset: f64,
    /// Playback length in seconds; `None` runs to the buffer's end.
    pub duration: Option<f64>,
    /// Explicit envelope; `None` lets the channel pick its default.
    pub envelope: Option<EnvelopeSpec>,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            start_time: None,
            offset: 0.0,
            duration: None,
            envelope: None,
        }
    }
}

/// Per-play tuning for synthesized tones.
#[derive(Clone, Copy, Debug)]
pub struct ToneOptions {
    pub volume: f32,
    pub start_time: Option<f64>,
    pub wave: Waveform,
    pub envelope: EnvelopeSpec,
}

impl Default for ToneOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            start_time: None,
            wave: Waveform::default(),
            envelope: EnvelopeSpec::Default,
        }
    }
}

#[derive(Clone)]
enum LastSound {
    Buffer {
        asset: Arc<SampleAsset>,
        channel: ChannelId,
        options: PlayOptions,
    },
    Tone {
        frequency: f32,
        duration: f64,
        channel: ChannelId,
        options: ToneOptions,
    },
}

struct ActiveVoice {
    /// Audio-clock time at which the voice will have finished on its own.
    end_time: f64,
}

/// One-shot playback front end. Playback is best-effort: every play method
/// returns `bool` and logs instead of erroring, so a missing sample or an
/// engine that is not ready never takes down a practice session.
pub struct PlaybackBus {
    handle: EngineHandle,
    channels: ChannelTable,
    cache: Arc<SampleCache>,
    normalizer: Box<dyn LoudnessNormalizer>,
    active: Mutex<HashMap<VoiceId, ActiveVoice>>,
    last_sound: Mutex<Option<LastSound>>,
    next_voice_id: AtomicU64,
}

impl PlaybackBus {
    pub fn new(handle: EngineHandle, mixer: &SignalMixer, cache: Arc<SampleCache>) -> Self {
        Self {
            handle,
            channels: mixer.channel_table(),
            cache,
            normalizer: Box::new(RmsNormalizer::default()),
            active: Mutex::new(HashMap::new()),
            last_sound: Mutex::new(None),
            next_voice_id: AtomicU64::new(1),
        }
    }

    /// Plays a decoded buffer on a channel. Chord-channel buffers get
    /// loudness normalization and the chord envelope.
    pub fn play_buffer(
        &self,
        asset: Arc<SampleAsset>,
        channel: ChannelId,
        options: PlayOptions,
    ) -> bool {
        if !self.validate(channel, !asset.is_empty(), &asset.key) {
            return false;
        }
        self.start_buffer_voice(asset, channel, options)
    }

    /// Like [`play_buffer`](Self::play_buffer), and additionally remembers
    /// the sound for [`repeat_last_sound`](Self::repeat_last_sound).
    pub fn play_sample(
        &self,
        asset: Arc<SampleAsset>,
        channel: ChannelId,
        options: PlayOptions,
    ) -> bool {
        if !self.validate(channel, !asset.is_empty(), &asset.key) {
            return false;
        }
        *self.last_sound.lock().expect("last-sound poisoned") = Some(LastSound::Buffer {
            asset: asset.clone(),
            channel,
            options,
        });
        self.start_buffer_voice(asset, channel, options)
    }

    /// Fetches (or reuses) a sample by URL, then plays it. A failed load
    /// is logged and reported as `false`.
    pub async fn play_sample_from_url(
        &self,
        url: &str,
        channel: ChannelId,
        options: PlayOptions,
    ) -> bool {
        match self.cache.load_sample(url).await {
            Ok(asset) => self.play_sample(asset, channel, options),
            Err(e) => {
                debug!(url, error = %e, "sample unavailable, skipping playback");
                false
            }
        }
    }

    /// Plays a synthesized tone of the given length.
    pub fn play_oscillator(
        &self,
        frequency: f32,
        duration: f64,
        channel: ChannelId,
        options: ToneOptions,
    ) -> bool {
        let valid_signal =
            frequency > 0.0 && frequency.is_finite() && duration > 0.0 && duration.is_finite();
        if !self.validate(channel, valid_signal, "oscillator") {
            return false;
        }
        *self.last_sound.lock().expect("last-sound poisoned") = Some(LastSound::Tone {
            frequency,
            duration,
            channel,
            options,
        });
        self.start_tone_voice(frequency, duration, channel, options)
    }

    /// Replays whatever the bus last played, at the current time.
    pub fn repeat_last_sound(&self) -> bool {
        let last = self.last_sound.lock().expect("last-sound poisoned").clone();
        match last {
            Some(LastSound::Buffer {
                asset,
                channel,
                options,
            }) => self.start_buffer_voice(
                asset,
                channel,
                PlayOptions {
                    start_time: None,
                    ..options
                },
            ),
            Some(LastSound::Tone {
                frequency,
                duration,
                channel,
                options,
            }) => self.start_tone_voice(
                frequency,
                duration,
                channel,
                ToneOptions {
                    start_time: None,
                    ..options
                },
            ),
            None => false,
        }
    }

    /// Stops every voice immediately.
    pub fn stop_all(&self) {
        self.handle.send(RenderCommand::StopAll);
        self.active.lock().expect("active set poisoned").clear();
    }

    /// Stops one voice if it is still playing.
    pub fn stop(&self, id: VoiceId) {
        if self
            .active
            .lock()
            .expect("active set poisoned")
            .remove(&id)
            .is_some()
        {
            self.handle.send(RenderCommand::StopVoice { id });
        }
    }

    /// Voices scheduled or playing right now. Finished voices are reaped
    /// by their computed end time.
    pub fn active_voice_count(&self) -> usize {
        let now = self.handle.now();
        let mut active = self.active.lock().expect("active set poisoned");
        active.retain(|_, voice| voice.end_time > now);
        active.len()
    }

    /// Ramps every channel to silence over `duration` seconds, then stops
    /// all voices and resets every channel gain to full scale. Callers
    /// that want the mixer's configured levels back must re-apply them.
    pub async fn fade_out_all(&self, duration: f64) {
        let duration = duration.max(0.0);
        let mut ramped = true;
        for id in ChannelId::ALL {
            ramped &= self.handle.send(RenderCommand::SetChannelGain {
                id,
                target: 0.0,
                ramp: Ramp::Linear { duration },
            });
        }
        if !ramped {
            // Queue trouble; cut hard rather than leave voices ringing.
            self.stop_all();
            return;
        }

        tokio::time::sleep(Duration::from_secs_f64(duration + FADE_TAIL)).await;
        self.stop_all();

        for id in ChannelId::ALL {
            self.channels.update(id, |strip| strip.volume = 1.0);
            self.handle.send(RenderCommand::SetChannelGain {
                id,
                target: 1.0,
                ramp: Ramp::Step,
            });
        }
    }

    fn validate(&self, channel: ChannelId, has_signal: bool, what: &str) -> bool {
        if !has_signal {
            warn!(sound = what, "refusing to play empty source");
            return false;
        }
        if !self.channels.exists(channel) {
            warn!(channel = %channel, "unknown mixer channel");
            return false;
        }
        if !self.handle.is_ready() {
            warn!(sound = what, "engine not ready, dropping playback");
            return false;
        }
        true
    }

    fn start_buffer_voice(
        &self,
        asset: Arc<SampleAsset>,
        channel: ChannelId,
        options: PlayOptions,
    ) -> bool {
        let volume = options.volume.clamp(0.0, 1.0);
        let (norm_gain, envelope) = if channel == ChannelId::Chords {
            (
                self.normalizer.gain_for(&asset),
                options.envelope.or(Some(EnvelopeSpec::chord_adsr())),
            )
        } else {
            (1.0, options.envelope)
        };

        let start_time = options.start_time.unwrap_or_else(|| self.handle.now());
        let offset = options.offset.max(0.0);
        let remaining = (asset.duration as f64 - offset).max(0.0);
        let play_length = options.duration.unwrap_or(remaining).min(remaining);

        let id = self.next_voice_id.fetch_add(1, Ordering::Relaxed);
        let spec = VoiceSpec {
            id,
            channel,
            source: SourceSpec::Buffer { asset },
            gain: volume * norm_gain,
            envelope,
            start_time,
            duration: Some(play_length),
            offset,
        };
        self.dispatch(id, spec, start_time + play_length)
    }

    fn start_tone_voice(
        &self,
        frequency: f32,
        duration: f64,
        channel: ChannelId,
        options: ToneOptions,
    ) -> bool {
        let start_time = options.start_time.unwrap_or_else(|| self.handle.now());
        let id = self.next_voice_id.fetch_add(1, Ordering::Relaxed);
        let spec = VoiceSpec {
            id,
            channel,
            source: SourceSpec::Oscillator {
                frequency,
                wave: options.wave,
            },
            gain: options.volume.clamp(0.0, 1.0),
            envelope: Some(options.envelope),
            start_time,
            duration: Some(duration),
            offset: 0.0,
        };
        self.dispatch(id, spec, start_time + duration)
    }

    fn dispatch(&self, id: VoiceId, spec: VoiceSpec, end_time: f64) -> bool {
        self.active
            .lock()
            .expect("active set poisoned")
            .insert(id, ActiveVoice { end_time });
        if self.handle.send(RenderCommand::StartVoice(Box::new(spec))) {
            true
        } else {
            self.active.lock().expect("active set poisoned").remove(&id);
            false
        }
    }
}
