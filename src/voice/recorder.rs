//! Voice-activity gated utterance recording

use std::time::Duration;

use super::block::{AudioBlock, AudioFormat, AudioWindow};
use super::capture::AudioSource;
use super::energy::rms_energy;
use crate::Error;
use crate::config::CaptureConfig;

/// Why a recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Energy stayed below the threshold for the silence duration
    Silence,
    /// The maximum recording length was reached
    MaxDuration,
}

/// Decision after observing one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Keep recording
    Continue,
    /// Stop recording
    Stop(StopReason),
}

/// Counts consecutive quiet blocks and the total block budget
#[derive(Debug, Clone)]
pub struct SilenceGate {
    threshold: f32,
    silence_blocks: usize,
    max_blocks: usize,
    quiet_run: usize,
    observed: usize,
}

impl SilenceGate {
    /// Create a gate from block counts
    #[must_use]
    pub const fn new(threshold: f32, silence_blocks: usize, max_blocks: usize) -> Self {
        Self {
            threshold,
            silence_blocks,
            max_blocks,
            quiet_run: 0,
            observed: 0,
        }
    }

    /// Record one block's energy
    pub fn observe(&mut self, energy: f32) -> GateDecision {
        self.observed += 1;

        if energy < self.threshold {
            self.quiet_run += 1;
            if self.quiet_run >= self.silence_blocks {
                return GateDecision::Stop(StopReason::Silence);
            }
        } else {
            self.quiet_run = 0;
        }

        self.tick()
    }

    /// Count a read that produced no block
    pub fn skip(&mut self) -> GateDecision {
        self.observed += 1;
        self.tick()
    }

    fn tick(&self) -> GateDecision {
        if self.observed >= self.max_blocks {
            GateDecision::Stop(StopReason::MaxDuration)
        } else {
            GateDecision::Continue
        }
    }

    /// Consecutive quiet blocks so far
    #[must_use]
    pub const fn quiet_run(&self) -> usize {
        self.quiet_run
    }

    /// Quiet blocks that end a recording
    #[must_use]
    pub const fn silence_blocks(&self) -> usize {
        self.silence_blocks
    }

    /// Block budget of one recording
    #[must_use]
    pub const fn max_blocks(&self) -> usize {
        self.max_blocks
    }
}

/// Audio captured for one utterance
#[derive(Debug)]
pub struct Recording {
    /// Mono window built from every recorded block
    pub window: AudioWindow,

    /// Why recording stopped
    pub stop: StopReason,

    /// Recorded audio length
    pub elapsed: Duration,
}

/// Records one utterance from an audio source
pub struct UtteranceRecorder {
    threshold: f32,
    silence: Duration,
    max: Duration,
}

impl UtteranceRecorder {
    /// Create a recorder from the capture settings
    #[must_use]
    pub const fn new(config: &CaptureConfig) -> Self {
        Self {
            threshold: config.silence_threshold,
            silence: config.silence_duration,
            max: config.max_duration,
        }
    }

    /// Record until the speaker goes quiet or the time limit is hit
    ///
    /// Transient read errors are skipped but still count toward the limit.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceClosed` if the source stops producing audio
    pub async fn record<S>(&self, source: &mut S) -> crate::Result<Recording>
    where
        S: AudioSource + ?Sized,
    {
        let format: AudioFormat = source.format();
        let mut gate = SilenceGate::new(
            self.threshold,
            format.blocks_for(self.silence),
            format.blocks_for(self.max),
        );
        let mut blocks: Vec<AudioBlock> = Vec::with_capacity(gate.max_blocks());

        tracing::info!("recording (stops when you stop talking)");

        let stop = loop {
            let decision = match source.read_block().await {
                Ok(block) => {
                    let energy = rms_energy(block.samples());
                    blocks.push(block);
                    gate.observe(energy)
                }
                Err(e @ Error::DeviceClosed(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable block");
                    gate.skip()
                }
            };

            if let GateDecision::Stop(reason) = decision {
                break reason;
            }
        };

        let window = AudioWindow::from_blocks(&blocks, format);
        let elapsed = window.duration();
        match stop {
            StopReason::Silence => {
                tracing::info!(elapsed = ?elapsed, "stopped on silence");
            }
            StopReason::MaxDuration => {
                tracing::info!(elapsed = ?elapsed, "stopped at maximum duration");
            }
        }

        Ok(Recording {
            window,
            stop,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_silence_run() {
        let mut gate = SilenceGate::new(300.0, 3, 100);
        assert_eq!(gate.observe(10.0), GateDecision::Continue);
        assert_eq!(gate.observe(10.0), GateDecision::Continue);
        assert_eq!(gate.observe(10.0), GateDecision::Stop(StopReason::Silence));
    }

    #[test]
    fn test_speech_resets_silence_run() {
        let mut gate = SilenceGate::new(300.0, 3, 100);
        gate.observe(10.0);
        gate.observe(10.0);
        assert_eq!(gate.observe(300.0), GateDecision::Continue);
        assert_eq!(gate.quiet_run(), 0);
        gate.observe(10.0);
        assert_eq!(gate.observe(10.0), GateDecision::Continue);
    }

    #[test]
    fn test_hard_cap_regardless_of_activity() {
        let mut gate = SilenceGate::new(300.0, 3, 5);
        for _ in 0..4 {
            assert_eq!(gate.observe(5000.0), GateDecision::Continue);
        }
        assert_eq!(gate.observe(5000.0), GateDecision::Stop(StopReason::MaxDuration));
    }

    #[test]
    fn test_skipped_reads_count_toward_cap() {
        let mut gate = SilenceGate::new(300.0, 3, 2);
        assert_eq!(gate.skip(), GateDecision::Continue);
        assert_eq!(gate.skip(), GateDecision::Stop(StopReason::MaxDuration));
    }
}
