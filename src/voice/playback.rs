//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::capture::{Direction, find_device};
use crate::config::PlaybackConfig;
use crate::{Error, Result};

/// Sample rate the cue tone is generated at
const CUE_SAMPLE_RATE: u32 = 16_000;

/// Output device for replies and cues
#[async_trait(?Send)]
pub trait AudioSink {
    /// Decode and play an encoded (MP3) buffer, returning when playback ends
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    async fn play_encoded(&mut self, audio: &[u8]) -> Result<()>;

    /// Play the short "start speaking" tone
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    async fn play_cue(&mut self) -> Result<()>;
}

/// Plays audio to an output device
pub struct SpeakerPlayback {
    device: Device,
    cue: Vec<f32>,
}

impl SpeakerPlayback {
    /// Open the configured output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(config: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_device(&host, config.device.as_deref(), Direction::Output)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            device,
            cue: cue_tone(config.cue_frequency, config.cue_duration, CUE_SAMPLE_RATE),
        })
    }

    /// Pick a stream config for `sample_rate`, falling back to the device default
    fn stream_config(&self, sample_rate: u32) -> Result<StreamConfig> {
        let supported = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .filter(|c| {
                (c.channels() == 1 || c.channels() == 2)
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels);

        if let Some(range) = supported {
            return Ok(range.with_sample_rate(SampleRate(sample_rate)).config());
        }

        self.device
            .default_output_config()
            .map(|c| c.config())
            .map_err(|e| Error::Playback(e.to_string()))
    }

    /// Play mono samples and wait for them to finish
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub async fn play_samples(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.stream_config(sample_rate)?;
        let samples = if config.sample_rate.0 == sample_rate {
            samples
        } else {
            tracing::debug!(
                from = sample_rate,
                to = config.sample_rate.0,
                "resampling for output device"
            );
            resample(&samples, sample_rate, config.sample_rate.0)?
        };

        let channels = usize::from(config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        // Poll for completion with timeout
        let duration_ms = (sample_count as u64 * 1000) / u64::from(config.sample_rate.0.max(1));
        let deadline = tokio::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if tokio::time::Instant::now() > deadline {
                tracing::warn!("playback did not report completion, stopping");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Small delay to ensure audio finishes
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

#[async_trait(?Send)]
impl AudioSink for SpeakerPlayback {
    async fn play_encoded(&mut self, audio: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(audio)?;
        self.play_samples(samples, sample_rate).await
    }

    async fn play_cue(&mut self) -> Result<()> {
        let cue = self.cue.clone();
        self.play_samples(cue, CUE_SAMPLE_RATE).await
    }
}

/// Generate a sine cue tone
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn cue_tone(frequency: f32, duration: Duration, sample_rate: u32) -> Vec<f32> {
    let count = (f64::from(sample_rate) * duration.as_secs_f64()) as usize;
    let rate = sample_rate as f32;
    (0..count)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate).sin())
        .collect()
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not decodable MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                let channels = frame.channels.max(1);

                #[allow(clippy::cast_precision_loss)]
                let divisor = channels as f32 * 32768.0;
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s)).sum();
                    sum / divisor
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(Error::Playback("MP3 contained no audio frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample audio using rubato
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + 1);

    for chunk in samples.chunks(chunk_size) {
        // Pad the tail so the final partial chunk is not lost
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}
