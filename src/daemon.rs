//! Daemon - the always-listening assistant loop
//!
//! Reads the microphone block by block, spots the wake word and hands each
//! command to the [`TurnOrchestrator`]. Everything runs on one logical thread;
//! the microphone is not read while a turn is in progress.

use std::future::Future;
use std::sync::Arc;

use crate::config::Config;
use crate::turn::{Services, TurnOrchestrator};
use crate::voice::{
    AudioSink, AudioSource, DecodingProfile, MicrophoneSource, SpeakerPlayback, Transcriber,
    WakeOutcome, WakeSpotter, apply_mic_gain, transcribe_or_empty,
};
use crate::Result;

/// The assistant daemon
pub struct Daemon {
    config: Config,
    spotter: WakeSpotter,
    orchestrator: TurnOrchestrator,
    stt: Arc<dyn Transcriber>,
    turns: usize,
}

impl Daemon {
    /// Create a daemon with HTTP clients built from `config`
    ///
    /// # Errors
    ///
    /// Returns error if a service client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Ok(Self::with_services(config, services))
    }

    /// Create a daemon with explicit service implementations
    #[must_use]
    pub fn with_services(config: Config, services: Services) -> Self {
        let spotter = WakeSpotter::new(&config.wake, config.capture.format());
        let stt = Arc::clone(&services.stt);
        let orchestrator = TurnOrchestrator::new(&config, services);

        Self {
            config,
            spotter,
            orchestrator,
            stt,
            turns: 0,
        }
    }

    /// Get the wake word
    #[must_use]
    pub fn wake_word(&self) -> &str {
        self.spotter.wake_word()
    }

    /// Turns run since startup; a wake word followed by silence is not counted
    #[must_use]
    pub const fn turns(&self) -> usize {
        self.turns
    }

    /// Turn orchestrator, including the conversation history
    #[must_use]
    pub const fn orchestrator(&self) -> &TurnOrchestrator {
        &self.orchestrator
    }

    /// Open the audio devices and listen until `shutdown` resolves
    ///
    /// Devices are released when this returns.
    ///
    /// # Errors
    ///
    /// Returns error if a device cannot be opened or the capture stream dies
    #[allow(clippy::future_not_send)]
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Some(gain) = &self.config.capture.gain {
            apply_mic_gain(gain).await;
        }

        let mut source = MicrophoneSource::open(&self.config.capture)?;
        let mut sink = SpeakerPlayback::open(&self.config.playback)?;
        self.log_banner();

        tokio::select! {
            () = shutdown => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            result = self.listen(&mut source, &mut sink) => result,
        }
    }

    /// Wake-word loop over an already open source and sink
    ///
    /// Only returns when the source reports a fatal error.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceClosed` once the source stops producing audio
    #[allow(clippy::future_not_send)]
    pub async fn listen<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<()>
    where
        S: AudioSource + ?Sized,
        K: AudioSink + ?Sized,
    {
        tracing::info!(wake_word = self.spotter.wake_word(), "listening for wake word");

        loop {
            let block = match source.read_block().await {
                Ok(block) => block,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "audio capture stopped");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable block");
                    continue;
                }
            };

            let Some(window) = self.spotter.push(block) else {
                continue;
            };

            let transcript = transcribe_or_empty(
                self.stt.as_ref(),
                &window,
                DecodingProfile::Fast,
                &self.config.wake.hint,
            )
            .await;

            let ran = match self.spotter.check(&transcript) {
                WakeOutcome::Missed => continue,
                WakeOutcome::Inline(command) => {
                    tracing::info!(command, "inline command");
                    source.discard_pending();
                    self.orchestrator.run_turn(command, source, sink).await?;
                    true
                }
                WakeOutcome::Capture => {
                    if let Err(e) = sink.play_cue().await {
                        tracing::warn!(error = %e, "cue playback failed");
                    }
                    source.discard_pending();
                    self.orchestrator
                        .capture_and_respond(source, sink)
                        .await?
                        .is_some()
                }
            };

            if ran {
                self.turns += 1;
            }
            let stale = source.discard_pending();
            self.spotter.reset();
            tracing::info!(
                stale_blocks = stale,
                wake_word = self.spotter.wake_word(),
                "listening for wake word"
            );
        }
    }

    fn log_banner(&self) {
        let name = crate::config::capitalize(self.spotter.wake_word());
        tracing::info!(
            assistant = %name,
            wake_word = self.spotter.wake_word(),
            input = self.config.capture.device.as_deref().unwrap_or("default"),
            output = self.config.playback.device.as_deref().unwrap_or("default"),
            stt = %self.config.stt.accurate_model,
            llm = %self.config.dialog.model,
            voice = %self.config.tts.voice_id,
            home = %self.config.home.base_url,
            "voice assistant ready"
        );
    }
}
