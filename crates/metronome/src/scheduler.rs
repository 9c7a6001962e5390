use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fretwise_audio::{EngineHandle, PlayOptions, PlaybackBus, SampleCache};
use fretwise_domain::{BeatEvent, ChannelId, SubscriptionId, Subscriptions};

use crate::tap::TapTempo;

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 240.0;
pub const MIN_BEATS_PER_MEASURE: u32 = 1;
pub const MAX_BEATS_PER_MEASURE: u32 = 12;

/// How far ahead of the audio clock clicks are committed, in seconds.
/// Far enough that a late tick never gaps, short enough that tempo
/// changes feel immediate.
const SCHEDULE_AHEAD: f64 = 0.1;

/// How often [`BeatScheduler::tick`] should be driven.
pub const LOOKAHEAD: Duration = Duration::from_millis(25);

/// Gap between `start()` and the first click, in seconds.
const START_DELAY: f64 = 0.05;

/// (frequency Hz, length s, volume) per click flavor.
const ACCENT_CLICK: (f32, f32, f32) = (1_200.0, 0.05, 1.0);
const BEAT_CLICK: (f32, f32, f32) = (800.0, 0.04, 0.8);
const SUBDIVISION_CLICK: (f32, f32, f32) = (600.0, 0.03, 0.5);

/// How each beat splits into clicks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl Subdivision {
    pub fn per_beat(self) -> u32 {
        match self {
            Subdivision::Quarter => 1,
            Subdivision::Eighth => 2,
            Subdivision::Sixteenth => 4,
        }
    }

    pub fn from_per_beat(count: u32) -> Option<Self> {
        match count {
            1 => Some(Subdivision::Quarter),
            2 => Some(Subdivision::Eighth),
            4 => Some(Subdivision::Sixteenth),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetronomeConfig {
    pub bpm: f32,
    pub beats_per_measure: u32,
    pub subdivision: Subdivision,
    /// Whether beat one of every measure gets the accent click.
    pub accent_first: bool,
    /// Overall click volume, multiplied into each click flavor's level.
    pub volume: f32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_measure: 4,
            subdivision: Subdivision::Quarter,
            accent_first: true,
            volume: 1.0,
        }
    }
}

impl MetronomeConfig {
    fn clamped(mut self) -> Self {
        self.bpm = self.bpm.clamp(MIN_BPM, MAX_BPM);
        self.beats_per_measure = self
            .beats_per_measure
            .clamp(MIN_BEATS_PER_MEASURE, MAX_BEATS_PER_MEASURE);
        self.volume = self.volume.clamp(0.0, 1.0);
        self
    }
}

/// Point-in-time metronome snapshot, emitted to state subscribers on
/// every start, stop, or configuration change.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct MetronomeState {
    pub running: bool,
    pub bpm: f32,
    pub beats_per_measure: u32,
    pub subdivision: Subdivision,
    /// Beat of the measure the scheduler will commit next, zero-based.
    pub current_beat: u32,
    pub current_subdivision: u32,
}

/// Look-ahead click scheduler. Clicks are committed to the playback bus
/// against the audio clock up to [`SCHEDULE_AHEAD`] seconds early, so
/// beat spacing depends only on rendered frames, never on how promptly
/// the control thread ticks.
pub struct BeatScheduler {
    handle: EngineHandle,
    bus: Arc<PlaybackBus>,
    cache: Arc<SampleCache>,
    config: MetronomeConfig,
    running: bool,
    beat: u32,
    sub: u32,
    next_note_time: f64,
    tap: TapTempo,
    beat_subs: Subscriptions<BeatEvent>,
    state_subs: Subscriptions<MetronomeState>,
}

impl BeatScheduler {
    pub fn new(
        handle: EngineHandle,
        bus: Arc<PlaybackBus>,
        cache: Arc<SampleCache>,
        config: MetronomeConfig,
    ) -> Self {
        Self {
            handle,
            bus,
            cache,
            config: config.clamped(),
            running: false,
            beat: 0,
            sub: 0,
            next_note_time: 0.0,
            tap: TapTempo::new(),
            beat_subs: Subscriptions::new(),
            state_subs: Subscriptions::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> MetronomeConfig {
        self.config
    }

    pub fn state(&self) -> MetronomeState {
        MetronomeState {
            running: self.running,
            bpm: self.config.bpm,
            beats_per_measure: self.config.beats_per_measure,
            subdivision: self.config.subdivision,
            current_beat: self.beat,
            current_subdivision: self.sub,
        }
    }

    /// Starts from the top of a measure, anchored to the current clock
    /// time. Idempotent while running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if !self.handle.is_ready() {
            warn!("engine not ready, metronome not started");
            return;
        }
        self.beat = 0;
        self.sub = 0;
        self.next_note_time = self.handle.now() + START_DELAY;
        self.running = true;
        debug!(bpm = self.config.bpm, "metronome started");
        self.emit_state();
    }

    /// Stops scheduling new clicks. Already-committed clicks still sound.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        debug!("metronome stopped");
        self.emit_state();
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.config.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.emit_state();
    }

    pub fn set_beats_per_measure(&mut self, beats: u32) {
        self.config.beats_per_measure =
            beats.clamp(MIN_BEATS_PER_MEASURE, MAX_BEATS_PER_MEASURE);
        if self.beat >= self.config.beats_per_measure {
            self.beat = 0;
        }
        self.emit_state();
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        self.config.subdivision = subdivision;
        if self.sub >= subdivision.per_beat() {
            self.sub = 0;
        }
        self.emit_state();
    }

    /// Registers a tap-tempo tap at `now_ms` (any monotonic millisecond
    /// source). A detected tempo in the playable range is committed as
    /// the new bpm and returned; out-of-range or too-few taps commit
    /// nothing.
    pub fn tap(&mut self, now_ms: f64) -> Option<f32> {
        let bpm = self.tap.tap_at(now_ms)?;
        self.set_bpm(bpm);
        Some(self.config.bpm)
    }

    pub fn set_accent_first(&mut self, accent_first: bool) {
        self.config.accent_first = accent_first;
        self.emit_state();
    }

    /// Sets the overall click volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        self.config.volume = volume.clamp(0.0, 1.0);
        self.emit_state();
    }

    /// Starts when stopped, stops when running.
    pub fn toggle(&mut self) {
        if self.running {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Beat events fire when a click is committed, carrying the clock
    /// time it will sound at, so UI animation can anticipate the beat.
    pub fn subscribe_beats<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&BeatEvent) + Send + 'static,
    {
        self.beat_subs.subscribe(observer)
    }

    pub fn unsubscribe_beats(&mut self, id: SubscriptionId) -> bool {
        self.beat_subs.unsubscribe(id)
    }

    pub fn subscribe_state<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&MetronomeState) + Send + 'static,
    {
        self.state_subs.subscribe(observer)
    }

    pub fn unsubscribe_state(&mut self, id: SubscriptionId) -> bool {
        self.state_subs.unsubscribe(id)
    }

    /// Commits every click falling inside the look-ahead horizon. Call at
    /// [`LOOKAHEAD`] intervals, or from [`Self::run`].
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let horizon = self.handle.now() + SCHEDULE_AHEAD;
        while self.next_note_time < horizon {
            self.schedule_click();
            self.advance();
        }
    }

    /// Drives the scheduler until it is stopped.
    pub async fn run(scheduler: Arc<Mutex<Self>>) {
        let mut interval = tokio::time::interval(LOOKAHEAD);
        loop {
            interval.tick().await;
            let mut this = scheduler.lock().expect("scheduler poisoned");
            if !this.running {
                break;
            }
            this.tick();
        }
    }

    fn schedule_click(&mut self) {
        let accented = self.config.accent_first && self.beat == 0 && self.sub == 0;
        let (frequency, length, volume) = if accented {
            ACCENT_CLICK
        } else if self.sub == 0 {
            BEAT_CLICK
        } else {
            SUBDIVISION_CLICK
        };

        let click = self
            .cache
            .click_asset(frequency, length, self.handle.sample_rate());
        self.bus.play_buffer(
            click,
            ChannelId::Metronome,
            PlayOptions {
                volume: volume * self.config.volume,
                start_time: Some(self.next_note_time),
                ..Default::default()
            },
        );

        let event = BeatEvent {
            beat: self.beat,
            subdivision: self.sub,
            time: self.next_note_time,
            accented,
        };
        self.beat_subs.emit(&event);
    }

    fn advance(&mut self) {
        let per_beat = self.config.subdivision.per_beat();
        self.next_note_time += 60.0 / self.config.bpm as f64 / per_beat as f64;
        self.sub += 1;
        if self.sub >= per_beat {
            self.sub = 0;
            self.beat = (self.beat + 1) % self.config.beats_per_measure;
        }
    }

    fn emit_state(&mut self) {
        let state = self.state();
        self.state_subs.emit(&state);
    }
}
