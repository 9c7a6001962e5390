use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use fretwise_domain::{
    nearest_string, note_from_frequency, StringMatch, SubscriptionId, Subscriptions, TuningState,
};

use crate::pitch::{PitchEstimator, FRAME_SIZE};

/// Frequency readings averaged for the displayed pitch. Small enough to
/// track a turning peg, large enough to stop the needle jittering.
const SMOOTHING_WINDOW: usize = 5;

pub const DEFAULT_TOLERANCE_CENTS: i32 = 5;
const MIN_TOLERANCE_CENTS: i32 = 1;
const MAX_TOLERANCE_CENTS: i32 = 20;

/// Cents of deviation at which accuracy bottoms out at zero.
const ACCURACY_RANGE_CENTS: f32 = 50.0;

/// Which way to turn the peg.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuneDirection {
    InTune,
    /// Pitch is sharp of target; loosen the string.
    Down,
    /// Pitch is flat of target; tighten the string.
    Up,
}

/// One string-tuning session: feeds captured audio through the pitch
/// estimator, smooths the result over a short window, and publishes
/// [`TuningState`] snapshots to subscribers.
pub struct TuningSession {
    estimator: PitchEstimator,
    tolerance_cents: i32,
    buffer: Vec<f32>,
    window: VecDeque<f32>,
    state: TuningState,
    subs: Subscriptions<TuningState>,
}

impl TuningSession {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            estimator: PitchEstimator::new(sample_rate),
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
            buffer: Vec::with_capacity(FRAME_SIZE * 2),
            window: VecDeque::with_capacity(SMOOTHING_WINDOW),
            state: TuningState::default(),
            subs: Subscriptions::new(),
        }
    }

    /// Sets how close to target counts as "in tune", clamped to sane
    /// bounds. Takes effect from the next analyzed frame.
    pub fn set_tolerance_cents(&mut self, cents: i32) {
        self.tolerance_cents = cents.clamp(MIN_TOLERANCE_CENTS, MAX_TOLERANCE_CENTS);
    }

    pub fn tolerance_cents(&self) -> i32 {
        self.tolerance_cents
    }

    pub fn state(&self) -> TuningState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening
    }

    pub fn start(&mut self) {
        if self.state.is_listening {
            return;
        }
        self.state = TuningState {
            is_listening: true,
            ..TuningState::default()
        };
        debug!("tuning session started");
        self.emit();
    }

    /// Stops listening and clears every reading.
    pub fn stop(&mut self) {
        if !self.state.is_listening {
            return;
        }
        self.buffer.clear();
        self.window.clear();
        self.state = TuningState::default();
        debug!("tuning session stopped");
        self.emit();
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&TuningState) + Send + 'static,
    {
        self.subs.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subs.unsubscribe(id)
    }

    /// Feeds captured mono samples. Whole analysis frames are consumed as
    /// they accumulate; each one updates the state and notifies
    /// subscribers. Samples arriving while stopped are discarded.
    pub fn ingest(&mut self, samples: &[f32]) {
        if !self.state.is_listening {
            return;
        }
        self.buffer.extend_from_slice(samples);
        while self.buffer.len() >= FRAME_SIZE {
            let frame: Vec<f32> = self.buffer.drain(..FRAME_SIZE).collect();
            self.analyze_frame(&frame);
        }
    }

    /// The string the player appears to be tuning, if any.
    pub fn string_match(&self) -> Option<StringMatch> {
        self.state.frequency.and_then(nearest_string)
    }

    /// Which way the pitch needs to move; `None` until a pitch is heard.
    pub fn direction(&self) -> Option<TuneDirection> {
        self.state.frequency?;
        Some(if self.state.cents.abs() <= self.tolerance_cents {
            TuneDirection::InTune
        } else if self.state.cents > 0 {
            TuneDirection::Down
        } else {
            TuneDirection::Up
        })
    }

    /// 0–100 score of how close the current pitch is to target. 0 at
    /// fifty cents off or worse, 100 dead on; 0 with no pitch at all.
    pub fn accuracy(&self) -> f32 {
        if self.state.frequency.is_none() {
            return 0.0;
        }
        (100.0 - self.state.cents.abs() as f32 / ACCURACY_RANGE_CENTS * 100.0).clamp(0.0, 100.0)
    }

    fn analyze_frame(&mut self, frame: &[f32]) {
        let energy: f32 = frame.iter().map(|s| s * s).sum();
        self.state.volume = (energy / frame.len() as f32).sqrt();

        match self.estimator.analyze(frame) {
            Some(reading) => {
                if self.window.len() == SMOOTHING_WINDOW {
                    self.window.pop_front();
                }
                self.window.push_back(reading.frequency);
                let smoothed =
                    self.window.iter().sum::<f32>() / self.window.len() as f32;

                self.state.frequency = Some(smoothed);
                match nearest_string(smoothed) {
                    Some(matched) => {
                        self.state.note = Some(matched.string.note());
                        self.state.octave = Some(matched.string.octave());
                        self.state.cents = matched.cents;
                    }
                    None => {
                        // Nowhere near an open string; report the nearest
                        // chromatic note instead.
                        let pitch = note_from_frequency(smoothed);
                        self.state.note = Some(pitch.note);
                        self.state.octave = Some(pitch.octave);
                        self.state.cents = pitch.cents;
                    }
                }
                self.state.is_in_tune = self.state.cents.abs() <= self.tolerance_cents;
            }
            None => {
                self.state.frequency = None;
                self.state.note = None;
                self.state.octave = None;
                self.state.cents = 0;
                self.state.is_in_tune = false;
            }
        }
        self.emit();
    }

    fn emit(&mut self) {
        let state = self.state;
        self.subs.emit(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fretwise_domain::{GuitarString, NoteName};
    use std::sync::{Arc, Mutex};

    const RATE: u32 = 44_100;

    fn sine(frequency: f32, frames: usize) -> Vec<f32> {
        (0..FRAME_SIZE * frames)
            .map(|i| 0.5 * (std::f32::consts::TAU * frequency * i as f32 / RATE as f32).sin())
            .collect()
    }

    fn listening_session() -> TuningSession {
        let mut session = TuningSession::new(RATE);
        session.start();
        session
    }

    #[test]
    fn an_in_tune_string_reads_in_tune() {
        let mut session = listening_session();
        session.ingest(&sine(82.41, SMOOTHING_WINDOW));

        let state = session.state();
        assert_eq!(state.note, Some(NoteName::E));
        assert_eq!(state.octave, Some(2));
        assert!(state.is_in_tune, "cents = {}", state.cents);
        assert_eq!(session.direction(), Some(TuneDirection::InTune));
        assert!(session.accuracy() > 90.0);
        assert_eq!(
            session.string_match().map(|m| m.string),
            Some(GuitarString::E2)
        );
    }

    #[test]
    fn a_flat_string_says_tune_up() {
        let mut session = listening_session();
        // Well flat of E2's 82.41 Hz.
        session.ingest(&sine(78.0, SMOOTHING_WINDOW));

        let state = session.state();
        assert!(state.cents < -DEFAULT_TOLERANCE_CENTS);
        assert!(!state.is_in_tune);
        assert_eq!(session.direction(), Some(TuneDirection::Up));
    }

    #[test]
    fn a_sharp_string_says_tune_down() {
        let mut session = listening_session();
        // Well sharp of E2's 82.41 Hz.
        session.ingest(&sine(86.0, SMOOTHING_WINDOW));

        let state = session.state();
        assert!(state.cents > DEFAULT_TOLERANCE_CENTS);
        assert_eq!(session.direction(), Some(TuneDirection::Down));
    }

    #[test]
    fn accuracy_falls_off_with_deviation_and_floors_at_zero() {
        let mut session = listening_session();
        session.ingest(&sine(82.41, SMOOTHING_WINDOW));
        let near = session.accuracy();
        assert!(near > 90.0);

        let mut off = listening_session();
        // Around half a semitone flat of E2: accuracy pinned to 0.
        off.ingest(&sine(80.0, SMOOTHING_WINDOW));
        assert!(off.state().cents <= -50);
        assert_relative_eq!(off.accuracy(), 0.0);
    }

    #[test]
    fn silence_clears_the_reading_but_keeps_listening() {
        let mut session = listening_session();
        session.ingest(&sine(110.0, SMOOTHING_WINDOW));
        assert!(session.state().frequency.is_some());

        session.ingest(&vec![0.0; FRAME_SIZE]);
        let state = session.state();
        assert!(state.is_listening);
        assert_eq!(state.frequency, None);
        assert_eq!(state.note, None);
        assert!(!state.is_in_tune);
        assert_eq!(session.direction(), None);
        assert_relative_eq!(session.accuracy(), 0.0);
    }

    #[test]
    fn partial_chunks_accumulate_into_frames() {
        let mut session = listening_session();
        let samples = sine(110.0, 1);
        for chunk in samples.chunks(1_000) {
            session.ingest(chunk);
        }
        assert_eq!(session.state().note, Some(NoteName::A));
    }

    #[test]
    fn tolerance_is_clamped() {
        let mut session = TuningSession::new(RATE);
        session.set_tolerance_cents(0);
        assert_eq!(session.tolerance_cents(), MIN_TOLERANCE_CENTS);
        session.set_tolerance_cents(99);
        assert_eq!(session.tolerance_cents(), MAX_TOLERANCE_CENTS);
    }

    #[test]
    fn stop_resets_state_and_ignores_audio() {
        let mut session = listening_session();
        session.ingest(&sine(196.0, SMOOTHING_WINDOW));
        session.stop();
        assert_eq!(session.state(), TuningState::default());

        session.ingest(&sine(196.0, SMOOTHING_WINDOW));
        assert_eq!(session.state().frequency, None);
    }

    #[test]
    fn subscribers_follow_every_frame() {
        let mut session = listening_session();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let id = session.subscribe(move |state| sink.lock().unwrap().push(*state));

        session.ingest(&sine(246.94, 2));
        assert_eq!(states.lock().unwrap().len(), 2);

        assert!(session.unsubscribe(id));
        session.ingest(&sine(246.94, 1));
        assert_eq!(states.lock().unwrap().len(), 2);
    }
}
