//! Microphone capture via `cpal` (cargo feature `mic`).
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.
//! [`AudioCapture::start`] streams [`AudioChunk`]s over an mpsc channel and
//! returns a [`StreamHandle`]; dropping the handle stops the stream.
//! [`record_until`] is the one-shot form used by the voice commands.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::wav::AudioClip;

/// Interleaved `f32` samples as delivered by one cpal callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Keeps the cpal stream alive; dropping it stops capture.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("input device uses unsupported sample format {0}")]
    SampleFormat(String),
}

/// Default input device plus its preferred stream configuration.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

impl AudioCapture {
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();

        if let Ok(name) = device.name() {
            log::info!(
                "audio: input device {name} ({} Hz, {} ch, {sample_format:?})",
                supported.sample_rate().0,
                supported.channels()
            );
        }

        Ok(Self {
            device,
            config: supported.into(),
            sample_format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start recording and forward every callback buffer to `tx`.
    ///
    /// `f32`, `i16` and `u16` devices are supported; integer samples are
    /// scaled into `[-1.0, 1.0]`.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate();
        let channels = self.channels();
        let on_error = |err: cpal::StreamError| log::error!("audio: stream error: {err}");

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.device.build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(AudioChunk {
                        samples: data.to_vec(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => self.device.build_input_stream(
                &self.config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(AudioChunk {
                        samples: data.iter().map(|&s| s as f32 / 32768.0).collect(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::U16 => self.device.build_input_stream(
                &self.config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(AudioChunk {
                        samples: data
                            .iter()
                            .map(|&s| (s as f32 - 32768.0) / 32768.0)
                            .collect(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            )?,
            other => return Err(CaptureError::SampleFormat(format!("{other:?}"))),
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }
}

/// Record from the default input device until `wait` returns, then return
/// the captured audio as a 16 kHz mono clip.
///
/// Blocking: `wait` typically reads a line from stdin.  Call from
/// `tokio::task::spawn_blocking` inside async code.
pub fn record_until<F: FnOnce()>(wait: F) -> Result<AudioClip, CaptureError> {
    let capture = AudioCapture::new()?;
    let (tx, rx) = mpsc::channel::<AudioChunk>();

    let handle = capture.start(tx)?;
    wait();
    drop(handle);

    let mut interleaved = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        interleaved.extend_from_slice(&chunk.samples);
    }

    let clip = AudioClip::from_interleaved(&interleaved, capture.sample_rate(), capture.channels());
    log::info!(
        "audio: recorded {:.2}s (peak {:.3})",
        clip.duration_secs(),
        clip.peak()
    );
    Ok(clip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn chunks_become_16k_clip() {
        let chunk = AudioChunk {
            samples: vec![0.2_f32; 96_000],
            sample_rate: 48_000,
            channels: 2,
        };
        let clip = AudioClip::from_interleaved(&chunk.samples, chunk.sample_rate, chunk.channels);
        assert_eq!(clip.len(), 16_000);
    }
}
