//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use super::buffer::{AudioChunk, CaptureReceiver, CaptureSender, capture_buffer};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Source of a microphone session
///
/// Opening yields a guard that keeps the device alive and a receiver for
/// the captured audio. Dropping the guard releases the device and closes
/// the receiver.
pub trait AudioInput {
    /// Keeps the capture running while held
    type Guard;

    /// Acquire the input device for one session
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn open(&self) -> Result<(Self::Guard, CaptureReceiver)>;
}

/// Default input device through cpal
#[derive(Debug, Clone, Copy)]
pub struct CpalInput {
    config: AudioConfig,
}

impl CpalInput {
    #[must_use]
    pub const fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl AudioInput for CpalInput {
    type Guard = Microphone;

    fn open(&self) -> Result<(Microphone, CaptureReceiver)> {
        Microphone::open(self.config)
    }
}

/// An open microphone stream feeding a capture buffer
pub struct Microphone {
    stream: Option<Stream>,
    sender: CaptureSender,
}

impl Microphone {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(config: AudioConfig) -> Result<(Self, CaptureReceiver)> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .any(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(config.rate)
                    && c.max_sample_rate() >= SampleRate(config.rate)
            });
        if !supported {
            return Err(Error::Audio(format!(
                "no mono input config at {} Hz",
                config.rate
            )));
        }

        let (sender, receiver) = capture_buffer();

        let fixed = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(config.rate),
            buffer_size: BufferSize::Fixed(config.chunk_size),
        };
        let stream = match build_stream(&device, &fixed, &sender) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    chunk_size = config.chunk_size,
                    "fixed buffer size rejected, using device default"
                );
                let fallback = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..fixed
                };
                build_stream(&device, &fallback, &sender)?
            }
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.rate,
            chunk_size = config.chunk_size,
            "microphone opened"
        );

        Ok((
            Self {
                stream: Some(stream),
                sender,
            },
            receiver,
        ))
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
        }
        self.sender.close();
        tracing::debug!("microphone closed");
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sender: &CaptureSender,
) -> Result<Stream> {
    let sender = sender.clone();
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sender.push(samples_to_pcm16(data));
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

/// Convert f32 samples to little-endian 16-bit PCM bytes
#[must_use]
pub fn samples_to_pcm16(samples: &[f32]) -> AudioChunk {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Convert f32 [-1.0, 1.0] to i16
        #[allow(clippy::cast_possible_truncation)]
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&sample_i16.to_le_bytes());
    }
    out
}
