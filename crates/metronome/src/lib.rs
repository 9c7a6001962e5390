pub mod scheduler;
pub mod tap;

pub use scheduler::{
    BeatScheduler, MetronomeConfig, MetronomeState, Subdivision, LOOKAHEAD, MAX_BEATS_PER_MEASURE,
    MAX_BPM, MIN_BEATS_PER_MEASURE, MIN_BPM,
};
pub use tap::TapTempo;
