pub mod channel;
pub mod error;
pub mod events;
pub mod note;
pub mod strings;

pub use crate::channel::ChannelId;
pub use crate::error::EngineError;
pub use crate::events::{
    BeatEvent, PitchReading, SubscriptionId, Subscriptions, TuningState,
};
pub use crate::note::{note_from_frequency, NoteName, NotePitch, A4_FREQUENCY, A4_MIDI_NUMBER};
pub use crate::strings::{nearest_string, GuitarString, StringMatch};
