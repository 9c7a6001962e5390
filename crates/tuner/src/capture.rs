use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{HeapConsumer, HeapRb};
use tracing::{debug, warn};

use fretwise_domain::EngineError;

use crate::pitch::FRAME_SIZE;

/// Ring capacity between the input callback and the analysis thread.
/// Several analysis frames deep, so a slow UI tick drops old audio
/// instead of blocking the device.
const RING_CAPACITY: usize = FRAME_SIZE * 4;

/// Microphone input feeding the tuner. Owns the input stream; samples are
/// downmixed to mono in the device callback and pulled with
/// [`MicCapture::read_into`] from the control thread.
///
/// Not `Send`: input streams are pinned to the thread that opened them.
pub struct MicCapture {
    _stream: cpal::Stream,
    consumer: HeapConsumer<f32>,
    sample_rate: u32,
}

impl MicCapture {
    /// Opens the default input device. All failure modes (no device,
    /// permission refused, device busy) surface as `MicrophoneDenied`.
    pub fn start() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::microphone("no input device available"))?;
        let config = device
            .default_input_config()
            .map_err(|e| EngineError::microphone(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let (mut producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks_exact(channels) {
                        let mono = frame.iter().sum::<f32>() / channels as f32;
                        // Overflow drops the newest samples; the tuner
                        // only ever wants recent audio anyway.
                        let _ = producer.push(mono);
                    }
                },
                |err| warn!(error = %err, "input stream error"),
                None,
            )
            .map_err(|e| EngineError::microphone(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::microphone(e.to_string()))?;

        debug!(sample_rate, channels, "microphone capture started");
        Ok(Self {
            _stream: stream,
            consumer,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Appends every buffered sample to `out`; returns how many arrived.
    pub fn read_into(&mut self, out: &mut Vec<f32>) -> usize {
        let mut count = 0;
        while let Some(sample) = self.consumer.pop() {
            out.push(sample);
            count += 1;
        }
        count
    }
}
