//! Audio capture from microphone

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig, StreamError};
use tokio::sync::mpsc;

use super::block::{AudioBlock, AudioFormat, AudioWindow};
use crate::config::{CaptureConfig, MicGain};
use crate::{Error, Result};

/// Blocks buffered between the device callback and the pipeline (~32s at 16kHz/512)
const QUEUE_BLOCKS: usize = 1024;

/// Source of fixed-size audio blocks
///
/// Implementations are bound to the thread that opened the device.
#[async_trait(?Send)]
pub trait AudioSource {
    /// Block format produced by this source
    fn format(&self) -> AudioFormat;

    /// Wait for exactly one block
    ///
    /// # Errors
    ///
    /// `Error::Audio` for a transient failure (skip and read again),
    /// `Error::DeviceClosed` when no more audio will arrive
    async fn read_block(&mut self) -> Result<AudioBlock>;

    /// Drop audio captured while the pipeline was busy, returning the block count
    fn discard_pending(&mut self) -> usize;
}

/// Sending half shared by the device data and error callbacks
///
/// The error callback closes the feed when the device goes away, which ends
/// the receiver and surfaces `Error::DeviceClosed` to the reader.
#[derive(Clone)]
struct BlockFeed {
    sender: Arc<Mutex<Option<mpsc::Sender<AudioBlock>>>>,
    overflowed: Arc<AtomicUsize>,
}

impl BlockFeed {
    fn new(sender: mpsc::Sender<AudioBlock>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            overflowed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a block, counting it as overflow when the queue is full
    fn send(&self, block: AudioBlock) {
        let Ok(guard) = self.sender.lock() else {
            return;
        };
        if let Some(sender) = guard.as_ref()
            && sender.try_send(block).is_err()
        {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Handle a stream error; a lost device closes the feed
    fn on_error(&self, err: &StreamError) {
        match err {
            StreamError::DeviceNotAvailable => {
                tracing::error!(error = %err, "input device lost");
                self.close();
            }
            StreamError::BackendSpecific { .. } => {
                tracing::warn!(error = %err, "audio capture error");
            }
        }
    }

    fn close(&self) {
        match self.sender.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }
}

/// Captures fixed-size i16 blocks from an input device
pub struct MicrophoneSource {
    format: AudioFormat,
    receiver: mpsc::Receiver<AudioBlock>,
    overflowed: Arc<AtomicUsize>,
    _stream: Stream,
}

impl MicrophoneSource {
    /// Open the configured input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let format = config.format();
        let host = cpal::default_host();
        let device = find_device(&host, config.device.as_deref(), Direction::Input)?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate() <= SampleRate(format.sample_rate)
                    && c.max_sample_rate() >= SampleRate(format.sample_rate)
            })
            .ok_or_else(|| {
                Error::Audio(format!(
                    "no input config with {} channels at {} Hz",
                    format.channels, format.sample_rate
                ))
            })?;

        let stream_config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(format.sample_rate))
            .config();

        let (sender, receiver) = mpsc::channel(QUEUE_BLOCKS);
        let feed = BlockFeed::new(sender);
        let overflowed = Arc::clone(&feed.overflowed);
        let error_feed = feed.clone();
        let samples_per_block = format.samples_per_block();
        let mut pending: Vec<i16> = Vec::with_capacity(samples_per_block);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        pending.push(to_i16(sample));
                        if pending.len() == samples_per_block {
                            let full = std::mem::replace(
                                &mut pending,
                                Vec::with_capacity(samples_per_block),
                            );
                            feed.send(AudioBlock::new(full));
                        }
                    }
                },
                move |err| error_feed.on_error(&err),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            block_size = format.block_size,
            "audio capture started"
        );

        Ok(Self {
            format,
            receiver,
            overflowed,
            _stream: stream,
        })
    }
}

#[async_trait(?Send)]
impl AudioSource for MicrophoneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn read_block(&mut self) -> Result<AudioBlock> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| Error::DeviceClosed("capture stream ended".to_string()))
    }

    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }

        let overflowed = self.overflowed.swap(0, Ordering::Relaxed);
        if overflowed > 0 {
            tracing::debug!(blocks = overflowed, "capture queue overflowed while busy");
        }
        discarded
    }
}

/// Device direction for lookup
#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Input,
    Output,
}

/// Find a device by exact name, or the host default when no name is given
pub(crate) fn find_device(host: &Host, name: Option<&str>, direction: Direction) -> Result<Device> {
    let Some(name) = name else {
        return match direction {
            Direction::Input => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string())),
            Direction::Output => host
                .default_output_device()
                .ok_or_else(|| Error::Audio("no output device available".to_string())),
        };
    };

    let mut devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| Error::Audio(e.to_string()))?;

    devices
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| Error::Audio(format!("audio device not found: {name}")))
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode a window as 16-bit mono WAV for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn window_to_wav(window: &AudioWindow) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: window.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in window.samples() {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Raise the microphone gain with `amixer`
///
/// Failures are logged; capture still works at the current gain.
pub async fn apply_mic_gain(gain: &MicGain) {
    for control in &gain.controls {
        let result = tokio::process::Command::new("amixer")
            .arg("-c")
            .arg(gain.card.to_string())
            .arg("set")
            .arg(control)
            .arg(format!("{}%", gain.percent))
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                tracing::debug!(card = gain.card, control, percent = gain.percent, "mixer gain set");
            }
            Ok(output) => {
                tracing::warn!(
                    card = gain.card,
                    control,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "amixer rejected gain setting"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not run amixer");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lost_device_ends_the_stream() {
        let (sender, mut receiver) = mpsc::channel(4);
        let feed = BlockFeed::new(sender);

        feed.send(AudioBlock::new(vec![1; 8]));
        feed.on_error(&StreamError::DeviceNotAvailable);
        feed.send(AudioBlock::new(vec![2; 8]));

        assert_eq!(receiver.recv().await.unwrap().samples(), &[1; 8]);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_backend_errors_keep_the_stream_open() {
        let (sender, mut receiver) = mpsc::channel(4);
        let feed = BlockFeed::new(sender);

        feed.on_error(&StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".to_string(),
            },
        });
        feed.send(AudioBlock::new(vec![3; 8]));

        assert_eq!(receiver.recv().await.unwrap().samples(), &[3; 8]);
    }

    #[test]
    fn test_full_queue_counts_overflow() {
        let (sender, _receiver) = mpsc::channel(1);
        let feed = BlockFeed::new(sender);

        feed.send(AudioBlock::new(vec![0; 8]));
        feed.send(AudioBlock::new(vec![0; 8]));

        assert_eq!(feed.overflowed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_to_i16_clamps() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.0), 32767);
        assert_eq!(to_i16(2.0), 32767);
        assert_eq!(to_i16(-2.0), -32768);
    }
}
