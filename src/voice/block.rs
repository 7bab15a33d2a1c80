//! Audio blocks and transcription windows

use std::time::Duration;

/// Full-scale value used to normalize 16-bit samples
const I16_SCALE: f32 = 32768.0;

/// Fixed block format of the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second per channel
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Frames per block
    pub block_size: usize,
}

impl AudioFormat {
    /// Interleaved samples in one block
    #[must_use]
    pub const fn samples_per_block(&self) -> usize {
        self.block_size * self.channels as usize
    }

    /// Wall-clock duration of one block
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }

    /// Number of whole blocks needed to cover `duration` (at least one)
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn blocks_for(&self, duration: Duration) -> usize {
        let blocks = (duration.as_secs_f64() / self.block_duration().as_secs_f64() - 1e-9).ceil();
        (blocks as usize).max(1)
    }
}

/// One fixed-size read from the capture device
///
/// Signed 16-bit samples, interleaved by channel. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    samples: Vec<i16>,
}

impl AudioBlock {
    /// Wrap captured samples
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of interleaved samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Mono, normalized samples built from consecutive blocks
///
/// Built fresh per wake check or utterance and consumed by one transcription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioWindow {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioWindow {
    /// Concatenate blocks and down-mix to one channel in [-1.0, 1.0]
    #[must_use]
    pub fn from_blocks(blocks: &[AudioBlock], format: AudioFormat) -> Self {
        let channels = usize::from(format.channels.max(1));
        let total: usize = blocks.iter().map(AudioBlock::len).sum();
        let mut samples = Vec::with_capacity(total / channels);

        #[allow(clippy::cast_precision_loss)]
        let divisor = channels as f32 * I16_SCALE;

        for block in blocks {
            samples.extend(block.samples().chunks_exact(channels).map(|frame| {
                let sum: f32 = frame.iter().map(|&s| f32::from(s)).sum();
                sum / divisor
            }));
        }

        Self {
            samples,
            sample_rate: format.sample_rate,
        }
    }

    /// Mono samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate of the window
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether the window holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the audio
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO: AudioFormat = AudioFormat {
        sample_rate: 16_000,
        channels: 2,
        block_size: 512,
    };

    #[test]
    fn test_blocks_for_reference_values() {
        // 512 frames at 16kHz = 32ms per block
        assert_eq!(STEREO.blocks_for(Duration::from_secs(2)), 63);
        assert_eq!(STEREO.blocks_for(Duration::from_secs(12)), 375);
        assert_eq!(STEREO.blocks_for(Duration::from_millis(1)), 1);
        assert_eq!(STEREO.samples_per_block(), 1024);
    }

    #[test]
    fn test_downmix_averages_channels() {
        let block = AudioBlock::new(vec![16384, 0, -32768, -32768]);
        let window = AudioWindow::from_blocks(&[block], STEREO);

        assert_eq!(window.samples(), &[0.25, -1.0]);
        assert_eq!(window.sample_rate(), 16_000);
    }

    #[test]
    fn test_mono_passthrough_and_duration() {
        let mono = AudioFormat {
            channels: 1,
            ..STEREO
        };
        let blocks = vec![AudioBlock::new(vec![0; 8000]), AudioBlock::new(vec![0; 8000])];
        let window = AudioWindow::from_blocks(&blocks, mono);

        assert_eq!(window.samples().len(), 16_000);
        assert_eq!(window.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_window() {
        let window = AudioWindow::from_blocks(&[], STEREO);
        assert!(window.is_empty());
        assert_eq!(window.duration(), Duration::ZERO);
    }
}
