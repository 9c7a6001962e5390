use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use fretwise_domain::ChannelId;

use crate::context::{EngineHandle, VOLUME_SMOOTHING};
use crate::render::{Ramp, RenderCommand};

/// Control-side record of one mixer channel. The audible gain lives in the
/// renderer; this is the source of truth for queries and mute restores.
#[derive(Clone, Copy, Debug)]
pub struct ChannelStrip {
    pub volume: f32,
    pub muted: bool,
}

/// Channel bookkeeping shared between the mixer and the playback bus.
#[derive(Clone, Default)]
pub(crate) struct ChannelTable {
    inner: Arc<Mutex<HashMap<ChannelId, ChannelStrip>>>,
}

impl ChannelTable {
    pub fn exists(&self, id: ChannelId) -> bool {
        self.inner.lock().expect("channel table poisoned").contains_key(&id)
    }

    pub fn get(&self, id: ChannelId) -> Option<ChannelStrip> {
        self.inner
            .lock()
            .expect("channel table poisoned")
            .get(&id)
            .copied()
    }

    pub fn insert(&self, id: ChannelId, strip: ChannelStrip) {
        self.inner
            .lock()
            .expect("channel table poisoned")
            .insert(id, strip);
    }

    pub fn update<F: FnOnce(&mut ChannelStrip)>(&self, id: ChannelId, f: F) -> Option<ChannelStrip> {
        let mut table = self.inner.lock().expect("channel table poisoned");
        let strip = table.get_mut(&id)?;
        f(strip);
        Some(*strip)
    }

    pub fn snapshot(&self) -> HashMap<ChannelId, ChannelStrip> {
        self.inner.lock().expect("channel table poisoned").clone()
    }
}

/// Named gain lanes between sound sources and the master chain. Every
/// channel exists from construction; there is no dynamic registry to
/// mistype a name into.
pub struct SignalMixer {
    handle: EngineHandle,
    channels: ChannelTable,
    /// Master volume captured by `mute`, restored by `unmute`.
    pre_mute: Mutex<Option<f32>>,
}

/// (channel, default volume) for the fixed channel set.
const DEFAULT_VOLUMES: [(ChannelId, f32); 4] = [
    (ChannelId::Chords, 0.8),
    (ChannelId::Scales, 0.8),
    (ChannelId::Metronome, 0.9),
    (ChannelId::Effects, 0.6),
];

impl SignalMixer {
    pub fn new(handle: EngineHandle) -> Self {
        let channels = ChannelTable::default();
        for (id, volume) in DEFAULT_VOLUMES {
            channels.insert(
                id,
                ChannelStrip {
                    volume,
                    muted: false,
                },
            );
            handle.send(RenderCommand::CreateChannel { id, gain: volume });
        }
        debug!("signal mixer channels created");
        Self {
            handle,
            channels,
            pre_mute: Mutex::new(None),
        }
    }

    pub(crate) fn channel_table(&self) -> ChannelTable {
        self.channels.clone()
    }

    /// (Re)creates a channel at the given volume. Re-creating an existing
    /// channel replaces it: last write wins.
    pub fn create_channel(&self, id: ChannelId, initial_volume: f32) {
        let volume = initial_volume.clamp(0.0, 1.0);
        self.channels.insert(
            id,
            ChannelStrip {
                volume,
                muted: false,
            },
        );
        self.handle
            .send(RenderCommand::CreateChannel { id, gain: volume });
    }

    /// Channel lookup; absence is a valid outcome, not an error.
    pub fn channel(&self, id: ChannelId) -> Option<ChannelStrip> {
        self.channels.get(id)
    }

    /// Sets a channel's volume, clamped to [0, 1]. Muted channels store
    /// the new volume but stay silent until unmuted.
    pub fn set_channel_volume(&self, id: ChannelId, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let strip = self.channels.update(id, |s| s.volume = volume);
        if let Some(strip) = strip {
            if !strip.muted {
                self.send_gain(id, volume);
            }
        }
    }

    pub fn channel_volume(&self, id: ChannelId) -> f32 {
        self.channels.get(id).map(|s| s.volume).unwrap_or(0.0)
    }

    pub fn is_muted(&self, id: ChannelId) -> bool {
        self.channels.get(id).map(|s| s.muted).unwrap_or(false)
    }

    /// Silences a channel while remembering its volume.
    pub fn mute_channel(&self, id: ChannelId) {
        if let Some(strip) = self.channels.update(id, |s| s.muted = true) {
            debug!(channel = %id, volume = strip.volume, "channel muted");
            self.send_gain(id, 0.0);
        }
    }

    /// Restores a muted channel to its remembered volume.
    pub fn unmute_channel(&self, id: ChannelId) {
        if let Some(strip) = self.channels.update(id, |s| s.muted = false) {
            self.send_gain(id, strip.volume);
        }
    }

    /// Silences the master bus, remembering the configured volume.
    pub fn mute(&self) {
        let mut pre_mute = self.pre_mute.lock().expect("mute state poisoned");
        if pre_mute.is_some() {
            return;
        }
        *pre_mute = Some(self.handle.master_volume());
        self.send_master(0.0);
        debug!("master muted");
    }

    /// Restores the master bus to its pre-mute volume.
    pub fn unmute(&self) {
        let restored = self.pre_mute.lock().expect("mute state poisoned").take();
        if let Some(volume) = restored {
            self.send_master(volume);
        }
    }

    pub fn toggle_mute(&self) {
        if self.is_master_muted() {
            self.unmute();
        } else {
            self.mute();
        }
    }

    pub fn is_master_muted(&self) -> bool {
        self.pre_mute.lock().expect("mute state poisoned").is_some()
    }

    /// Linearly ramps the master bus to silence over `duration` seconds.
    /// The configured volume is untouched; [`fade_in`](Self::fade_in)
    /// brings it back.
    pub fn fade_out(&self, duration: f64) {
        self.handle.send(RenderCommand::SetMasterGain {
            target: 0.0,
            ramp: Ramp::Linear { duration },
        });
    }

    /// Linearly ramps the master bus back to the configured volume.
    pub fn fade_in(&self, duration: f64) {
        self.handle.send(RenderCommand::SetMasterGain {
            target: self.handle.master_volume(),
            ramp: Ramp::Linear { duration },
        });
    }

    /// Current volume of every channel, for settings screens.
    pub fn all_volumes(&self) -> HashMap<ChannelId, f32> {
        self.channels
            .snapshot()
            .into_iter()
            .map(|(id, strip)| (id, strip.volume))
            .collect()
    }

    fn send_gain(&self, id: ChannelId, target: f32) {
        self.handle.send(RenderCommand::SetChannelGain {
            id,
            target,
            ramp: Ramp::Smooth {
                time_constant: VOLUME_SMOOTHING,
            },
        });
    }

    fn send_master(&self, target: f32) {
        self.handle.send(RenderCommand::SetMasterGain {
            target,
            ramp: Ramp::Smooth {
                time_constant: VOLUME_SMOOTHING,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OfflineBackend;
    use crate::context::AudioContextManager;
    use approx::assert_relative_eq;

    fn mixer() -> SignalMixer {
        let mut ctx = AudioContextManager::new(Box::new(OfflineBackend::new()));
        ctx.initialize().unwrap();
        SignalMixer::new(ctx.handle().unwrap())
    }

    #[test]
    fn channels_start_at_their_defaults() {
        let mixer = mixer();
        assert_relative_eq!(mixer.channel_volume(ChannelId::Chords), 0.8);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Scales), 0.8);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Metronome), 0.9);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Effects), 0.6);
    }

    #[test]
    fn volume_is_clamped() {
        let mixer = mixer();
        mixer.set_channel_volume(ChannelId::Effects, 2.0);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Effects), 1.0);
        mixer.set_channel_volume(ChannelId::Effects, -1.0);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Effects), 0.0);
    }

    #[test]
    fn mute_preserves_volume_for_unmute() {
        let mixer = mixer();
        mixer.set_channel_volume(ChannelId::Metronome, 0.5);
        mixer.mute_channel(ChannelId::Metronome);
        assert!(mixer.is_muted(ChannelId::Metronome));
        assert_relative_eq!(mixer.channel_volume(ChannelId::Metronome), 0.5);

        mixer.unmute_channel(ChannelId::Metronome);
        assert!(!mixer.is_muted(ChannelId::Metronome));
        assert_relative_eq!(mixer.channel_volume(ChannelId::Metronome), 0.5);
    }

    #[test]
    fn setting_volume_while_muted_keeps_silence() {
        let mixer = mixer();
        mixer.mute_channel(ChannelId::Chords);
        mixer.set_channel_volume(ChannelId::Chords, 0.3);
        assert!(mixer.is_muted(ChannelId::Chords));
        assert_relative_eq!(mixer.channel_volume(ChannelId::Chords), 0.3);
    }

    #[test]
    fn recreating_a_channel_replaces_it() {
        let mixer = mixer();
        mixer.create_channel(ChannelId::Effects, 0.4);
        assert_relative_eq!(mixer.channel_volume(ChannelId::Effects), 0.4);
        assert!(!mixer.channel(ChannelId::Effects).unwrap().muted);
    }

    #[test]
    fn master_mute_toggles_and_is_idempotent() {
        let mixer = mixer();
        assert!(!mixer.is_master_muted());
        mixer.mute();
        mixer.mute();
        assert!(mixer.is_master_muted());
        mixer.toggle_mute();
        assert!(!mixer.is_master_muted());
        mixer.toggle_mute();
        assert!(mixer.is_master_muted());
        mixer.unmute();
        assert!(!mixer.is_master_muted());
    }

    #[test]
    fn all_volumes_covers_every_channel() {
        let mixer = mixer();
        let volumes = mixer.all_volumes();
        assert_eq!(volumes.len(), ChannelId::ALL.len());
    }
}
