use serde::{Deserialize, Serialize};

use crate::note::NoteName;

/// One scheduled metronome beat. `time` is on the audio clock, i.e. the
/// moment the click will actually sound.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BeatEvent {
    pub beat: u32,
    pub subdivision: u32,
    pub time: f64,
    pub accented: bool,
}

/// One pitch-analysis frame with a reliable reading. Frames with no
/// reliable pitch produce no reading at all; silence and noise are normal
/// operating conditions, not errors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitchReading {
    pub frequency: f32,
    pub note: NoteName,
    pub octave: i32,
    pub cents: i32,
    /// Autocorrelation peak relative to zero-lag energy, in (0, 1].
    pub confidence: f32,
}

/// Smoothed tuner view derived from a rolling window of pitch readings.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TuningState {
    pub is_listening: bool,
    pub frequency: Option<f32>,
    pub note: Option<NoteName>,
    pub octave: Option<i32>,
    pub cents: i32,
    pub is_in_tune: bool,
    pub volume: f32,
}

/// Handle returned by [`Subscriptions::subscribe`]; pass it back to
/// [`Subscriptions::unsubscribe`] to detach the observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Explicit observer registry. Replaces ad hoc callback sets with
/// subscribe/unsubscribe handles so listeners cannot leak silently.
pub struct Subscriptions<T> {
    next_id: u64,
    observers: Vec<(SubscriptionId, Box<dyn FnMut(&T) + Send>)>,
}

impl<T> Subscriptions<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns true when the handle was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub_id, _)| *sub_id != id);
        self.observers.len() != before
    }

    pub fn emit(&mut self, event: &T) {
        for (_, observer) in &mut self.observers {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<T> Default for Subscriptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn emit_reaches_all_subscribers() {
        let mut subs: Subscriptions<u32> = Subscriptions::new();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let count = count.clone();
            subs.subscribe(move |value| {
                count.fetch_add(*value, Ordering::SeqCst);
            });
        }
        subs.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn beat_events_serialize_for_diagnostics() {
        let event = BeatEvent {
            beat: 2,
            subdivision: 1,
            time: 1.25,
            accented: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: BeatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unsubscribe_detaches_exactly_one() {
        let mut subs: Subscriptions<u32> = Subscriptions::new();
        let count = Arc::new(AtomicU32::new(0));
        let c1 = count.clone();
        let first = subs.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        subs.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subs.unsubscribe(first));
        assert!(!subs.unsubscribe(first));
        subs.emit(&0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
