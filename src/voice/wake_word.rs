//! Wake word spotting
//!
//! Accumulates blocks into fixed, non-overlapping windows and checks each
//! window's fast transcription for the trigger phrase. A phrase spoken across
//! a window boundary is missed; windows never overlap.

use super::block::{AudioBlock, AudioFormat, AudioWindow};
use crate::config::WakeConfig;

/// Punctuation stripped around the text that follows the wake word
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?'];

/// State of the wake spotter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotterState {
    /// Collecting blocks for the next window
    Accumulating,
    /// A full window was handed out and awaits its transcript
    Checking,
    /// Wake word found in the last window
    Triggered,
}

/// Result of checking one window's transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// No wake word; keep listening
    Missed,
    /// Wake word alone; cue the user and record the command
    Capture,
    /// Wake word followed by a command in the same breath
    Inline(String),
}

/// Spots the wake word in a live block stream
pub struct WakeSpotter {
    wake_word: String,
    inline_min_chars: usize,
    blocks_per_window: usize,
    format: AudioFormat,
    buffer: Vec<AudioBlock>,
    state: SpotterState,
}

impl WakeSpotter {
    /// Create a new spotter for the given block format
    #[must_use]
    pub fn new(config: &WakeConfig, format: AudioFormat) -> Self {
        let wake_word = config.phrase.trim().to_lowercase();
        let blocks_per_window = format.blocks_for(config.window);

        tracing::debug!(wake_word, blocks_per_window, "wake spotter initialized");

        Self {
            wake_word,
            inline_min_chars: config.inline_min_chars,
            blocks_per_window,
            format,
            buffer: Vec::with_capacity(blocks_per_window),
            state: SpotterState::Accumulating,
        }
    }

    /// Add a block; returns a window once enough audio has accumulated
    ///
    /// The buffer is emptied whenever a window is returned.
    pub fn push(&mut self, block: AudioBlock) -> Option<AudioWindow> {
        if self.state != SpotterState::Accumulating {
            self.reset();
        }

        self.buffer.push(block);
        if self.buffer.len() < self.blocks_per_window {
            return None;
        }

        let window = AudioWindow::from_blocks(&self.buffer, self.format);
        self.buffer.clear();
        self.state = SpotterState::Checking;
        Some(window)
    }

    /// Decide what a window's transcript means
    pub fn check(&mut self, transcript: &str) -> WakeOutcome {
        let normalized = transcript.to_lowercase();

        let Some(trailing) = text_after_wake_word(&normalized, &self.wake_word) else {
            tracing::trace!(transcript, "no wake word in window");
            self.reset();
            return WakeOutcome::Missed;
        };

        tracing::info!(wake_word = %self.wake_word, transcript, "wake word detected");
        self.state = SpotterState::Triggered;

        if trailing.chars().count() > self.inline_min_chars {
            WakeOutcome::Inline(trailing.to_string())
        } else {
            WakeOutcome::Capture
        }
    }

    /// Return to accumulating with an empty buffer
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = SpotterState::Accumulating;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> SpotterState {
        self.state
    }

    /// Get the configured wake word
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Blocks that make up one window
    #[must_use]
    pub const fn blocks_per_window(&self) -> usize {
        self.blocks_per_window
    }

    /// Blocks accumulated toward the next window
    #[must_use]
    pub fn buffered_blocks(&self) -> usize {
        self.buffer.len()
    }
}

/// Text after the first occurrence of the wake word, trimmed
fn text_after_wake_word<'a>(normalized: &'a str, wake_word: &str) -> Option<&'a str> {
    normalized
        .split_once(wake_word)
        .map(|(_, after)| {
            after.trim_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c))
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn spotter() -> WakeSpotter {
        let config = WakeConfig {
            phrase: "megatron".to_string(),
            window: Duration::from_secs(2),
            inline_min_chars: 3,
            hint: String::new(),
        };
        let format = AudioFormat {
            sample_rate: 16_000,
            channels: 2,
            block_size: 512,
        };
        WakeSpotter::new(&config, format)
    }

    #[test]
    fn test_text_after_wake_word() {
        assert_eq!(
            text_after_wake_word("hey megatron, dim the lights.", "megatron"),
            Some("dim the lights")
        );
        assert_eq!(text_after_wake_word("megatron?", "megatron"), Some(""));
        assert_eq!(text_after_wake_word("hello world", "megatron"), None);
    }

    #[test]
    fn test_any_whitespace_is_trimmed() {
        assert_eq!(
            text_after_wake_word("megatron,\n\tturn off the fan\n", "megatron"),
            Some("turn off the fan")
        );
    }

    #[test]
    fn test_only_first_occurrence_splits() {
        assert_eq!(
            text_after_wake_word("megatron tell megatron hi", "megatron"),
            Some("tell megatron hi")
        );
    }

    #[test]
    fn test_inline_threshold_boundary() {
        let mut s = spotter();
        assert_eq!(s.check("Megatron, off."), WakeOutcome::Capture);
        assert_eq!(s.check("Megatron, stop."), WakeOutcome::Inline("stop".to_string()));
    }

    #[test]
    fn test_window_fill_empties_buffer() {
        let mut s = spotter();
        for _ in 0..s.blocks_per_window() - 1 {
            assert!(s.push(AudioBlock::new(vec![0; 1024])).is_none());
        }
        let window = s.push(AudioBlock::new(vec![0; 1024])).unwrap();

        assert_eq!(window.samples().len(), 512 * s.blocks_per_window());
        assert_eq!(s.buffered_blocks(), 0);
        assert_eq!(s.state(), SpotterState::Checking);
    }
}
