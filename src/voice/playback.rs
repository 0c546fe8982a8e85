//! Audio playback to speakers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Plays a WAV file to completion
#[async_trait]
pub trait Player: Send + Sync {
    /// Play the file, returning once the last sample has been output
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    async fn play(&self, wav: &Path) -> Result<()>;
}

/// Plays audio to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Play mono f32 samples in a blocking manner
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    pub fn play_samples_blocking(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok().and_then(|mut configs| {
                configs.find(|c| {
                    c.channels() == channels
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
        };
        let supported = supports(1)
            .or_else(|| supports(2))
            .ok_or_else(|| {
                Error::Playback(format!("no output config at {sample_rate} Hz"))
            })?;

        let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();
        let channels = usize::from(config.channels);

        let sample_count = samples.len();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_flag = Arc::clone(&finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if position < samples.len() {
                            position += 1;
                        } else {
                            finished_flag.store(true, Ordering::Release);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!(samples = sample_count, "playback did not drain before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device flush its last period
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

#[async_trait]
impl Player for AudioPlayback {
    async fn play(&self, wav: &Path) -> Result<()> {
        let path: PathBuf = wav.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let (samples, sample_rate) = read_wav(&path)?;
            Self::play_samples_blocking(samples, sample_rate)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

/// Decode a WAV file into mono f32 samples and its sample rate
///
/// # Errors
///
/// Returns error if the file is not a readable WAV
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| Error::Playback(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| int_to_f32(v, scale)))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(e.to_string()))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(e.to_string()))?,
    };

    // Average channels down to mono
    #[allow(clippy::cast_precision_loss)]
    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((samples, spec.sample_rate))
}

#[allow(clippy::cast_precision_loss)]
fn int_scale(bits_per_sample: u16) -> f32 {
    (1_i64 << bits_per_sample.saturating_sub(1)) as f32
}

#[allow(clippy::cast_precision_loss)]
fn int_to_f32(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}
