//! Turn orchestration
//!
//! One turn runs strictly in sequence: dialog exchange, directive dispatch,
//! reply cleanup, synthesis and playback. A spoken reply ending in `?`
//! records one more utterance without the wake word and loops.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::Instrument;
use uuid::Uuid;

use crate::Result;
use crate::config::Config;
use crate::dialog::{ChatCompletions, ConversationHistory, ConversationTurn, DialogExchange};
use crate::directive::{
    DirectiveSink, DispatchReport, HomeAssistant, clean_response, dispatch_all, extract_directives,
};
use crate::voice::{
    AudioSink, AudioSource, DecodingProfile, ElevenLabs, SpeechSynthesizer, Transcriber,
    UtteranceRecorder, WhisperApi, transcribe_or_empty,
};

/// External services a turn depends on
#[derive(Clone)]
pub struct Services {
    /// Speech-to-text
    pub stt: Arc<dyn Transcriber>,
    /// Language model
    pub dialog: Arc<dyn DialogExchange>,
    /// Text-to-speech
    pub tts: Arc<dyn SpeechSynthesizer>,
    /// Home control
    pub home: Arc<dyn DirectiveSink>,
}

impl Services {
    /// Build the HTTP clients for every service
    ///
    /// # Errors
    ///
    /// Returns error if a credential is missing or a client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            stt: Arc::new(WhisperApi::new(&config.stt)?),
            dialog: Arc::new(ChatCompletions::new(&config.dialog)?),
            tts: Arc::new(ElevenLabs::new(&config.tts)?),
            home: Arc::new(HomeAssistant::new(&config.home)?),
        })
    }
}

/// Transcribed user speech
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Trimmed, non-empty transcript
    pub text: String,
    /// When recording finished
    pub captured_at: DateTime<Local>,
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// The last reply was spoken and asked nothing
    Completed,
    /// The last reply held only directives
    Silent,
    /// A follow-up recording produced no speech
    NoSpeech,
    /// The dialog exchange failed
    DialogFailed,
    /// Speech synthesis failed
    SynthesisFailed,
    /// Playback failed
    PlaybackFailed,
}

/// Summary of one turn including its follow-ups
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Identifier carried by the turn's log span
    pub turn_id: Uuid,
    /// Dialog exchanges attempted
    pub exchanges: usize,
    /// Follow-up recordings started
    pub follow_ups: usize,
    /// Directive outcomes across all exchanges
    pub directives: DispatchReport,
    /// Why the turn stopped
    pub end: TurnEnd,
}

/// Result of one exchange-and-speak step
enum Step {
    Spoke { question: bool },
    Ended(TurnEnd),
}

/// Drives turns and owns the conversation history
pub struct TurnOrchestrator {
    services: Services,
    history: ConversationHistory,
    system_prompt: String,
    recorder: UtteranceRecorder,
    capture_hint: String,
}

impl TurnOrchestrator {
    /// Create an orchestrator with an empty history
    #[must_use]
    pub fn new(config: &Config, services: Services) -> Self {
        Self {
            services,
            history: ConversationHistory::new(
                config.dialog.history_capacity,
                config.dialog.context_turns,
            ),
            system_prompt: config.dialog.system_prompt.clone(),
            recorder: UtteranceRecorder::new(&config.capture),
            capture_hint: config.capture.hint.clone(),
        }
    }

    /// Conversation so far
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Record one utterance and transcribe it with the accurate profile
    ///
    /// Returns `None` when nothing intelligible was said.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceClosed` if the source stops producing audio
    pub async fn capture_utterance<S>(&self, source: &mut S) -> Result<Option<Utterance>>
    where
        S: AudioSource + ?Sized,
    {
        let recording = self.recorder.record(source).await?;

        let started = Instant::now();
        let text = transcribe_or_empty(
            self.services.stt.as_ref(),
            &recording.window,
            DecodingProfile::Accurate,
            &self.capture_hint,
        )
        .await;
        tracing::debug!(elapsed_ms = elapsed_ms(started), "utterance transcribed");

        if text.is_empty() {
            tracing::info!("no speech detected");
            return Ok(None);
        }

        tracing::info!(text, "heard");
        Ok(Some(Utterance {
            text,
            captured_at: Local::now(),
        }))
    }

    /// Record an utterance and, if one was heard, run a turn for it
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceClosed` if the source stops producing audio
    pub async fn capture_and_respond<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
    ) -> Result<Option<TurnReport>>
    where
        S: AudioSource + ?Sized,
        K: AudioSink + ?Sized,
    {
        match self.capture_utterance(source).await? {
            Some(utterance) => self.run_turn(utterance.text, source, sink).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run a turn for `text`, following up while replies end in a question
    ///
    /// Service failures end the turn and are reported in [`TurnReport::end`].
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceClosed` if a follow-up recording loses the source
    pub async fn run_turn<S, K>(
        &mut self,
        text: String,
        source: &mut S,
        sink: &mut K,
    ) -> Result<TurnReport>
    where
        S: AudioSource + ?Sized,
        K: AudioSink + ?Sized,
    {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("turn", %turn_id);
        self.follow_up_loop(turn_id, text, source, sink)
            .instrument(span)
            .await
    }

    /// Run a single exchange for `text` without any follow-up recording
    pub async fn respond_once<K>(&mut self, text: String, sink: &mut K) -> TurnReport
    where
        K: AudioSink + ?Sized,
    {
        let turn_id = Uuid::new_v4();
        let mut directives = DispatchReport::default();
        let step = self
            .exchange_and_speak(&text, sink, &mut directives)
            .instrument(tracing::info_span!("turn", %turn_id))
            .await;

        TurnReport {
            turn_id,
            exchanges: 1,
            follow_ups: 0,
            directives,
            end: match step {
                Step::Spoke { .. } => TurnEnd::Completed,
                Step::Ended(end) => end,
            },
        }
    }

    async fn follow_up_loop<S, K>(
        &mut self,
        turn_id: Uuid,
        mut text: String,
        source: &mut S,
        sink: &mut K,
    ) -> Result<TurnReport>
    where
        S: AudioSource + ?Sized,
        K: AudioSink + ?Sized,
    {
        let mut report = TurnReport {
            turn_id,
            exchanges: 0,
            follow_ups: 0,
            directives: DispatchReport::default(),
            end: TurnEnd::Completed,
        };

        loop {
            report.exchanges += 1;
            match self
                .exchange_and_speak(&text, sink, &mut report.directives)
                .await
            {
                Step::Spoke { question: false } => break,
                Step::Ended(end) => {
                    report.end = end;
                    break;
                }
                Step::Spoke { question: true } => {}
            }

            report.follow_ups += 1;
            let stale = source.discard_pending();
            tracing::debug!(stale_blocks = stale, "reply was a question, listening again");

            match self.capture_utterance(source).await? {
                Some(utterance) => text = utterance.text,
                None => {
                    report.end = TurnEnd::NoSpeech;
                    break;
                }
            }
        }

        tracing::info!(
            exchanges = report.exchanges,
            follow_ups = report.follow_ups,
            directives_ok = report.directives.succeeded,
            directives_failed = report.directives.failed,
            end = ?report.end,
            "turn finished"
        );
        Ok(report)
    }

    /// One dialog exchange, its directives, and the spoken reply
    async fn exchange_and_speak<K>(
        &mut self,
        text: &str,
        sink: &mut K,
        directives: &mut DispatchReport,
    ) -> Step
    where
        K: AudioSink + ?Sized,
    {
        self.history.push(ConversationTurn::user(text));
        let messages = self.history.context(&self.system_prompt);

        let started = Instant::now();
        let reply = match self.services.dialog.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "dialog exchange failed");
                return Step::Ended(TurnEnd::DialogFailed);
            }
        };
        tracing::debug!(elapsed_ms = elapsed_ms(started), "dialog exchange complete");
        self.history.push(ConversationTurn::assistant(reply.as_str()));

        let extracted = extract_directives(&reply);
        if !extracted.is_empty() {
            directives.merge(dispatch_all(self.services.home.as_ref(), &extracted).await);
        }

        let spoken = clean_response(&reply);
        if spoken.is_empty() {
            tracing::debug!("reply had nothing to say");
            return Step::Ended(TurnEnd::Silent);
        }
        tracing::info!(reply = %spoken, "replying");

        let started = Instant::now();
        let audio = match self.services.tts.synthesize(&spoken).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, "speech synthesis failed");
                return Step::Ended(TurnEnd::SynthesisFailed);
            }
        };
        tracing::debug!(elapsed_ms = elapsed_ms(started), "speech synthesized");

        if let Err(e) = sink.play_encoded(&audio).await {
            tracing::error!(error = %e, "playback failed");
            return Step::Ended(TurnEnd::PlaybackFailed);
        }

        Step::Spoke {
            question: spoken.trim_end().ends_with('?'),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
