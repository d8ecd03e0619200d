//! Audio playback path: base64 payload, decoded buffer, rate-adjusted
//! samples, output device.
//!
//! # Pipeline
//!
//! ```text
//! base64 audio → decode_audio → AudioBuffer (24 kHz mono f32)
//!             → apply_playback_rate (at AudioSink::device_rate)
//!             → AudioSink::play → cpal callback (render)
//! ```
//!
//! The output device sits behind the [`AudioOutput`] / [`AudioSink`]
//! traits so the speech pipeline can be tested without hardware.

pub mod device;
pub mod output;
pub mod pcm;
pub mod resample;

pub use device::{CpalOutput, CpalSink};
pub use output::{
    render, ActiveVoice, AudioOutput, AudioSink, HaltHandle, PlaybackHandle, SinkError,
    VoiceSignal,
};
pub use pcm::{decode_audio, decode_audio_bytes, decode_pcm16, AudioBuffer, DecodeError, OUTPUT_SAMPLE_RATE};
pub use resample::{apply_playback_rate, resample, stereo_to_mono};
