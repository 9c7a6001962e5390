pub mod backend;
pub mod bus;
pub mod cache;
pub mod clock;
pub mod context;
pub mod decode;
pub mod mixer;
pub mod normalize;
pub mod render;
pub mod sample;
pub mod synth;

pub use backend::{CpalBackend, OfflineBackend, OutputBackend, StreamConfig};
pub use bus::{PlaybackBus, PlayOptions, ToneOptions, DEFAULT_FADE_OUT};
pub use cache::{
    chord_sample_url, note_sample_url, AssetFetcher, CacheStats, HttpFetcher, NullFetcher,
    SampleCache,
};
pub use clock::AudioClock;
pub use context::{
    AudioContextManager, ContextState, EngineHandle, EngineState, DEFAULT_MASTER_VOLUME,
};
pub use decode::decode_bytes;
pub use mixer::{ChannelStrip, SignalMixer};
pub use normalize::{LoudnessNormalizer, RmsNormalizer};
pub use render::envelope::EnvelopeSpec;
pub use render::voice::{VoiceId, Waveform};
pub use render::AnalyserTap;
pub use sample::SampleAsset;
pub use synth::{synthesize_click, synthesize_note};
