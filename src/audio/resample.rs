//! Audio resampling and channel mixing utilities.
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels to mono.
//! 2. [`resample`] — linear-interpolation resampler between arbitrary rates.
//! 3. [`apply_playback_rate`] — speed a buffer up or down for a device.
//!
//! Playback speed is applied by pretending the source was recorded at
//! `rate × source_rate` and resampling that to the device rate, so pitch
//! moves with speed.

use super::pcm::AudioBuffer;
use crate::config::PlaybackRate;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use gemini_chat::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input unchanged.
/// * Empty input, or a non-positive rate, returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// # Example
///
/// ```rust
/// use gemini_chat::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// let lo = resample(&hi, 48_000.0, 24_000.0);
/// assert_eq!(lo.len(), 240);
/// ```
pub fn resample(samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
    if samples.is_empty() || source_rate <= 0.0 || target_rate <= 0.0 {
        return Vec::new();
    }

    if (source_rate - target_rate).abs() < f64::EPSILON {
        return samples.to_vec();
    }

    let ratio = target_rate / source_rate;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// apply_playback_rate
// ---------------------------------------------------------------------------

/// Produce samples that, played at `device_rate`, sound like `buffer` at
/// `rate` × normal speed.
pub fn apply_playback_rate(buffer: &AudioBuffer, rate: PlaybackRate, device_rate: u32) -> Vec<f32> {
    let effective_source = f64::from(buffer.sample_rate) * f64::from(rate.as_f32());
    resample(&buffer.samples, effective_source, f64::from(device_rate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resample(&input, 24_000.0, 24_000.0), input);
    }

    #[test]
    fn resample_empty_or_invalid_rate() {
        assert!(resample(&[], 48_000.0, 24_000.0).is_empty());
        assert!(resample(&[0.1], 0.0, 24_000.0).is_empty());
        assert!(resample(&[0.1], 24_000.0, -1.0).is_empty());
    }

    #[test]
    fn resample_upsample_doubles_length() {
        let out = resample(&[0.0_f32; 80], 12_000.0, 24_000.0);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_constant_signal_preserves_amplitude() {
        let out = resample(&[0.5_f32; 480], 48_000.0, 44_100.0);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    // ---- apply_playback_rate -----------------------------------------------

    #[test]
    fn double_speed_halves_length() {
        let buf = AudioBuffer::new(vec![0.2; 2_400], 24_000);
        let out = apply_playback_rate(&buf, PlaybackRate::new(2.0).unwrap(), 24_000);
        assert_eq!(out.len(), 1_200);
    }

    #[test]
    fn half_speed_doubles_length() {
        let buf = AudioBuffer::new(vec![0.2; 2_400], 24_000);
        let out = apply_playback_rate(&buf, PlaybackRate::new(0.5).unwrap(), 24_000);
        assert_eq!(out.len(), 4_800);
    }

    #[test]
    fn normal_speed_on_48k_device_upsamples() {
        let buf = AudioBuffer::new(vec![0.2; 240], 24_000);
        let out = apply_playback_rate(&buf, PlaybackRate::NORMAL, 48_000);
        assert_eq!(out.len(), 480);
    }
}
