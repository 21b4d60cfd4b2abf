//! Channel mixing and sample-rate conversion.
//!
//! Transcribers take **16 kHz mono `f32`** audio.  WAV files and microphone
//! streams arrive at whatever the device or recorder used, so every clip
//! goes through:
//!
//! 1. [`stereo_to_mono`] to average interleaved channels.
//! 2. [`resample_to_16k`] to convert to 16 000 Hz by linear interpolation.

const TARGET_RATE: u32 = 16_000;

/// Average interleaved frames down to one channel.
///
/// A trailing partial frame is dropped; `channels == 0` yields nothing.
///
/// ```rust
/// use qgis_plugin_generator::audio::stereo_to_mono;
///
/// let mono = stereo_to_mono(&[0.5_f32, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
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

/// Linear-interpolation resampler from `source_rate` to 16 kHz.
///
/// Output length is `ceil(len * 16000 / source_rate)`.  A zero source rate
/// cannot be interpreted and yields an empty clip.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_RATE {
        return samples.to_vec();
    }
    if samples.is_empty() || source_rate == 0 {
        return Vec::new();
    }

    let ratio = TARGET_RATE as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}
