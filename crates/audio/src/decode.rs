use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use fretwise_domain::EngineError;

use crate::sample::SampleAsset;

/// Decodes a fetched audio file (wav/mp3/flac/…) into a mono PCM asset.
/// Multi-channel sources are downmixed by averaging.
pub fn decode_bytes(bytes: Vec<u8>, key: &str) -> Result<SampleAsset, EngineError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = key.rsplit('.').next() {
        if !ext.contains('/') {
            hint.with_extension(ext);
        }
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EngineError::decode(format!("probe failed for {key}: {e}")))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| EngineError::decode(format!("no default track in {key}")))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::decode(format!("unsupported codec in {key}: {e}")))?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut mono: Vec<f32> = Vec::new();

    loop {
        match format.next_packet() {
            Ok(packet) => {
                let decoded = match decoder.decode(&packet) {
                    Ok(decoded) => decoded,
                    // skip undecodable packet
                    Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                    Err(e) => {
                        return Err(EngineError::decode(format!("decode failed for {key}: {e}")))
                    }
                };
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let frames = decoded.frames() as u64;
                if frames == 0 {
                    continue;
                }
                let mut interleaved = SampleBuffer::<f32>::new(frames, spec);
                interleaved.copy_interleaved_ref(decoded);
                mono.extend(
                    interleaved
                        .samples()
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                );
            }
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(EngineError::decode(format!("read failed for {key}: {e}")));
            }
        }
    }

    if mono.is_empty() {
        return Err(EngineError::decode(format!("no audio frames in {key}")));
    }

    Ok(SampleAsset::new(key, mono, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = decode_bytes(vec![0u8; 64], "/samples/chords/A.wav");
        assert!(matches!(result, Err(EngineError::DecodeFailed(_))));
    }

    #[test]
    fn decodes_a_minimal_wav() {
        // 16-bit mono RIFF/WAVE header followed by a short ramp.
        let sample_rate: u32 = 8_000;
        let samples: Vec<i16> = (0..64).map(|i| (i * 256) as i16).collect();
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in &samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let asset = decode_bytes(bytes, "/samples/notes/E2_fret0.wav").unwrap();
        assert_eq!(asset.sample_rate, sample_rate);
        assert_eq!(asset.frames.len(), 64);
    }
}
