use thiserror::Error;

/// Failure kinds surfaced by the audio engine. Playback paths never return
/// these to callers (they log and report `false`); loading and capture
/// paths do.
#[derive(Clone, Debug, Error)]
pub enum EngineError {
    #[error("audio context failed: {0}")]
    ContextFailed(String),
    #[error("sample load failed: {0}")]
    SampleLoadFailed(String),
    #[error("audio decode failed: {0}")]
    DecodeFailed(String),
    #[error("microphone access denied: {0}")]
    MicrophoneDenied(String),
    #[error("playback failed: {0}")]
    PlaybackFailed(String),
}

impl EngineError {
    pub fn context<T: Into<String>>(message: T) -> Self {
        Self::ContextFailed(message.into())
    }

    pub fn sample_load<T: Into<String>>(message: T) -> Self {
        Self::SampleLoadFailed(message.into())
    }

    pub fn decode<T: Into<String>>(message: T) -> Self {
        Self::DecodeFailed(message.into())
    }

    pub fn microphone<T: Into<String>>(message: T) -> Self {
        Self::MicrophoneDenied(message.into())
    }
}
