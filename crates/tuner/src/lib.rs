pub mod capture;
pub mod pitch;
pub mod session;

pub use capture::MicCapture;
pub use pitch::{PitchEstimator, FRAME_SIZE};
pub use session::{TuneDirection, TuningSession, DEFAULT_TOLERANCE_CENTS};
