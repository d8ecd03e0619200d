//! Decoded audio buffers and the decoder for synthesised speech.
//!
//! The synthesis service answers with base64 audio that is either raw
//! little-endian signed 16-bit mono PCM at [`OUTPUT_SAMPLE_RATE`], or a
//! RIFF/WAV container.  [`decode_audio`] handles both and always yields mono
//! `f32` samples at [`OUTPUT_SAMPLE_RATE`]; interpreting the bytes at any
//! other rate would play them at the wrong pitch and speed.

use std::io::Cursor;

use thiserror::Error;

use super::resample::{resample, stereo_to_mono};
use crate::attachments::{decode_payload, PayloadError};

/// Sample rate of synthesised speech, used for decoding and for the output
/// context.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Mono `f32` samples in `[-1.0, 1.0]` with their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds at the buffer's own sample rate.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Errors from [`decode_audio`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("audio payload: {0}")]
    Payload(#[from] PayloadError),

    /// Raw 16-bit PCM must have an even number of bytes.
    #[error("raw PCM audio has an odd byte count ({0})")]
    OddByteCount(usize),

    #[error("invalid WAV data: {0}")]
    Wav(String),

    #[error("unsupported WAV sample format ({bits}-bit {format})")]
    UnsupportedFormat { bits: u16, format: &'static str },

    /// Decoding produced no samples at all.
    #[error("audio contains no samples")]
    NoSamples,
}

impl From<hound::Error> for DecodeError {
    fn from(e: hound::Error) -> Self {
        DecodeError::Wav(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a base64 audio payload into a playable buffer at
/// [`OUTPUT_SAMPLE_RATE`].
pub fn decode_audio(encoded: &str) -> Result<AudioBuffer, DecodeError> {
    let bytes = decode_payload(encoded)?;
    decode_audio_bytes(&bytes)
}

/// Decode raw audio bytes, detecting a WAV container by its magic number.
pub fn decode_audio_bytes(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let buffer = if is_wav(bytes) {
        decode_wav(bytes)?
    } else {
        decode_pcm16(bytes, OUTPUT_SAMPLE_RATE)?
    };

    if buffer.is_empty() {
        return Err(DecodeError::NoSamples);
    }
    Ok(buffer)
}

/// Interpret `bytes` as little-endian signed 16-bit mono PCM.
///
/// ```
/// use gemini_chat::audio::decode_pcm16;
///
/// let buf = decode_pcm16(&[0x00, 0x40, 0x00, 0xC0], 24_000).unwrap();
/// assert_eq!(buf.samples, vec![0.5, -0.5]);
/// ```
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Result<AudioBuffer, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteCount(bytes.len()));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
        .collect();
    Ok(AudioBuffer::new(samples, sample_rate))
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a WAV container, downmix to mono and resample to
/// [`OUTPUT_SAMPLE_RATE`].
fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(DecodeError::UnsupportedFormat {
                bits,
                format: match format {
                    hound::SampleFormat::Int => "int",
                    hound::SampleFormat::Float => "float",
                },
            })
        }
    };

    let mono = stereo_to_mono(&interleaved, spec.channels);
    let samples = if spec.sample_rate == OUTPUT_SAMPLE_RATE {
        mono
    } else {
        log::debug!(
            "audio: resampling WAV from {} Hz to {OUTPUT_SAMPLE_RATE} Hz",
            spec.sample_rate
        );
        resample(&mono, f64::from(spec.sample_rate), f64::from(OUTPUT_SAMPLE_RATE))
    };

    Ok(AudioBuffer::new(samples, OUTPUT_SAMPLE_RATE))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::encode_payload;

    fn wav_bytes(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn raw_pcm_decodes_at_output_rate() {
        let pcm: Vec<u8> = [0i16, 16_384, -32_768, 32_767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let buf = decode_audio(&encode_payload(&pcm)).unwrap();

        assert_eq!(buf.sample_rate, OUTPUT_SAMPLE_RATE);
        assert_eq!(buf.samples.len(), 4);
        assert_eq!(buf.samples[0], 0.0);
        assert_eq!(buf.samples[1], 0.5);
        assert_eq!(buf.samples[2], -1.0);
        assert!((buf.samples[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn odd_byte_count_is_a_decode_error() {
        let err = decode_audio(&encode_payload(&[1, 2, 3])).unwrap_err();
        assert_eq!(err, DecodeError::OddByteCount(3));
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        assert!(matches!(
            decode_audio("%%%"),
            Err(DecodeError::Payload(PayloadError::InvalidBase64(_)))
        ));
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        assert!(matches!(
            decode_audio(""),
            Err(DecodeError::Payload(PayloadError::Empty))
        ));
    }

    #[test]
    fn mono_wav_at_output_rate_is_passed_through() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: OUTPUT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[16_384; 240]);
        let buf = decode_audio_bytes(&bytes).unwrap();
        assert_eq!(buf.samples.len(), 240);
        assert!(buf.samples.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn stereo_wav_is_downmixed_and_resampled() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // 480 stereo frames = 10 ms @ 48 kHz
        let bytes = wav_bytes(spec, &[8_192; 960]);
        let buf = decode_audio_bytes(&bytes).unwrap();

        assert_eq!(buf.sample_rate, OUTPUT_SAMPLE_RATE);
        assert_eq!(buf.samples.len(), 240); // 10 ms @ 24 kHz
        assert!(buf.samples.iter().all(|&s| (s - 0.25).abs() < 1e-5));
    }

    #[test]
    fn truncated_wav_header_is_a_decode_error() {
        let mut bytes = b"RIFF\0\0\0\0WAVE".to_vec();
        bytes.extend_from_slice(b"junk");
        assert!(matches!(decode_audio_bytes(&bytes), Err(DecodeError::Wav(_))));
    }

    #[test]
    fn duration_reflects_sample_rate() {
        let buf = AudioBuffer::new(vec![0.0; 12_000], OUTPUT_SAMPLE_RATE);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-6);
    }
}
