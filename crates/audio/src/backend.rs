use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fretwise_domain::EngineError;

use crate::render::Renderer;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            buffer_size: 512,
        }
    }
}

/// Where rendered audio goes. The device backend pulls blocks from its own
/// callback thread; the offline backend renders only when driven through
/// [`OutputBackend::process`].
///
/// Deliberately not `Send`: device streams are pinned to the thread that
/// opened them, so the context owns its backend on the control thread.
pub trait OutputBackend {
    fn config(&self) -> StreamConfig;

    /// Takes ownership of the renderer and begins pulling audio.
    fn start(&mut self, renderer: Renderer) -> Result<(), EngineError>;

    fn pause(&mut self) -> Result<(), EngineError>;

    fn resume(&mut self) -> Result<(), EngineError>;

    /// Renders `frames` on the caller's thread. Only meaningful for
    /// backends without a device clock; the default is a no-op.
    fn process(&mut self, _frames: usize) {}
}

/// Plays through the system's default output device.
pub struct CpalBackend {
    device: cpal::Device,
    config: StreamConfig,
    stream: Option<cpal::Stream>,
}

impl CpalBackend {
    /// Binds the default output device and adopts its native sample rate.
    pub fn new() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::context("no output device available"))?;
        let default = device
            .default_output_config()
            .map_err(|e| EngineError::context(e.to_string()))?;
        let config = StreamConfig {
            sample_rate: default.sample_rate().0,
            channels: default.channels(),
            ..Default::default()
        };
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "bound default output device"
        );
        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl OutputBackend for CpalBackend {
    fn config(&self) -> StreamConfig {
        self.config
    }

    fn start(&mut self, mut renderer: Renderer) -> Result<(), EngineError> {
        let channels = self.config.channels as usize;
        let stream_config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let mut mono: Vec<f32> = Vec::new();
        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);
                    renderer.render(&mut mono);
                    for (frame, sample) in mono.iter().enumerate() {
                        for ch in 0..channels {
                            data[frame * channels + ch] = *sample;
                        }
                    }
                },
                |err| warn!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| EngineError::context(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::context(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        if let Some(stream) = &self.stream {
            stream
                .pause()
                .map_err(|e| EngineError::PlaybackFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| EngineError::PlaybackFailed(e.to_string()))?;
        }
        Ok(())
    }
}

/// Device-free backend for tests and headless use. Time advances only
/// when the caller processes frames.
#[derive(Default)]
pub struct OfflineBackend {
    config: StreamConfig,
    renderer: Option<Renderer>,
    paused: bool,
    scratch: Vec<f32>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }
}

impl OutputBackend for OfflineBackend {
    fn config(&self) -> StreamConfig {
        self.config
    }

    fn start(&mut self, renderer: Renderer) -> Result<(), EngineError> {
        debug!(sample_rate = self.config.sample_rate, "starting offline backend");
        self.renderer = Some(renderer);
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        self.paused = false;
        Ok(())
    }

    fn process(&mut self, frames: usize) {
        if self.paused {
            return;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            self.scratch.resize(frames, 0.0);
            renderer.render(&mut self.scratch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AudioClock;
    use crate::render::AnalyserTap;
    use crossbeam_channel::bounded;

    #[test]
    fn offline_backend_advances_only_when_processed() {
        let (_tx, rx) = bounded(8);
        let clock = AudioClock::new(44_100);
        let renderer = Renderer::new(rx, clock.clone(), AnalyserTap::new(), 0.8);

        let mut backend = OfflineBackend::new();
        backend.start(renderer).unwrap();
        assert_eq!(clock.frames(), 0);

        backend.process(512);
        assert_eq!(clock.frames(), 512);

        backend.pause().unwrap();
        backend.process(512);
        assert_eq!(clock.frames(), 512);

        backend.resume().unwrap();
        backend.process(256);
        assert_eq!(clock.frames(), 768);
    }
}
