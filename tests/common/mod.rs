//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, speaker and network services so the
//! pipeline can run without audio hardware or API keys.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use homevoice::config::file::ConfigFile;
use homevoice::dialog::{ConversationTurn, DialogExchange};
use homevoice::directive::{DirectiveSink, ServiceCall};
use homevoice::turn::Services;
use homevoice::voice::{
    AudioBlock, AudioFormat, AudioSink, AudioSource, AudioWindow, DecodingProfile,
    SpeechSynthesizer, Transcriber,
};
use homevoice::{Config, Error, Result};

/// Config with short windows: 2-block wake window, 3-block silence, 10-block cap
///
/// Blocks are 512 stereo frames at 16 kHz (32 ms).
pub fn test_config() -> Config {
    config_from_toml(
        r#"
        [wake]
        window_secs = 0.064

        [capture]
        silence_secs = 0.096
        max_record_secs = 0.32
        "#,
    )
}

/// Config from a TOML snippet with test credentials
pub fn config_from_toml(toml_text: &str) -> Config {
    let fc: ConfigFile = toml::from_str(toml_text).expect("valid test toml");
    Config::from_sources(fc, |key: &str| match key {
        "GROQ_API_KEY" => Some("gsk_test".to_string()),
        "ELEVENLABS_API_KEY" => Some("xi_test".to_string()),
        "HA_ACCESS_TOKEN" => Some("ha_test".to_string()),
        _ => None,
    })
    .expect("valid test config")
}

/// Block whose RMS energy is `level`
pub fn block(format: AudioFormat, level: i16) -> AudioBlock {
    AudioBlock::new(vec![level; format.samples_per_block()])
}

/// Block well above the default silence threshold
pub fn loud(format: AudioFormat) -> AudioBlock {
    block(format, 3000)
}

/// Block below the default silence threshold
pub fn quiet(format: AudioFormat) -> AudioBlock {
    block(format, 20)
}

/// Audio source replaying a fixed script, then reporting the device closed
pub struct ScriptedSource {
    format: AudioFormat,
    script: VecDeque<Result<AudioBlock>>,
    pub reads: usize,
    pub discards: usize,
}

impl ScriptedSource {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            script: VecDeque::new(),
            reads: 0,
            discards: 0,
        }
    }

    /// Queue blocks
    pub fn then(mut self, blocks: impl IntoIterator<Item = AudioBlock>) -> Self {
        self.script.extend(blocks.into_iter().map(Ok));
        self
    }

    /// Queue `count` copies of a block
    pub fn repeat(self, block: &AudioBlock, count: usize) -> Self {
        self.then(std::iter::repeat_n(block.clone(), count))
    }

    /// Queue a transient read error
    pub fn then_error(mut self) -> Self {
        self.script
            .push_back(Err(Error::Audio("simulated overrun".to_string())));
        self
    }

    /// Scripted reads not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait(?Send)]
impl AudioSource for ScriptedSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn read_block(&mut self) -> Result<AudioBlock> {
        self.reads += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(Error::DeviceClosed("script exhausted".to_string())))
    }

    fn discard_pending(&mut self) -> usize {
        self.discards += 1;
        0
    }
}

/// Speaker that records what it was asked to play
#[derive(Default)]
pub struct RecordingSink {
    pub played: Vec<Vec<u8>>,
    pub cues: usize,
    pub fail_playback: bool,
}

impl RecordingSink {
    /// Played audio decoded back to the text the fake synthesizer encoded
    pub fn spoken(&self) -> Vec<String> {
        self.played
            .iter()
            .map(|audio| String::from_utf8_lossy(audio).into_owned())
            .collect()
    }
}

#[async_trait(?Send)]
impl AudioSink for RecordingSink {
    async fn play_encoded(&mut self, audio: &[u8]) -> Result<()> {
        if self.fail_playback {
            return Err(Error::Playback("speaker unplugged".to_string()));
        }
        self.played.push(audio.to_vec());
        Ok(())
    }

    async fn play_cue(&mut self) -> Result<()> {
        self.cues += 1;
        Ok(())
    }
}

/// Transcriber answering from per-profile queues; an empty queue yields ""
#[derive(Default)]
pub struct ScriptedTranscriber {
    fast: Mutex<VecDeque<String>>,
    accurate: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<(DecodingProfile, String)>>,
}

impl ScriptedTranscriber {
    pub fn new(fast: &[&str], accurate: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fast: Mutex::new(fast.iter().map(ToString::to_string).collect()),
            accurate: Mutex::new(accurate.iter().map(ToString::to_string).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn profiles(&self) -> Vec<DecodingProfile> {
        self.calls.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _window: &AudioWindow,
        profile: DecodingProfile,
        hint: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().push((profile, hint.to_string()));
        let queue = match profile {
            DecodingProfile::Fast => &self.fast,
            DecodingProfile::Accurate => &self.accurate,
        };
        Ok(queue.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Dialog replying from a script; records every request
#[derive(Default)]
pub struct ScriptedDialog {
    replies: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedDialog {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok((*r).to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(Error::Dialog("503".to_string()))])),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// User messages in request order
    pub fn user_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|messages| messages.last())
            .map(|turn| turn.content.clone())
            .collect()
    }
}

#[async_trait]
impl DialogExchange for ScriptedDialog {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Okay.".to_string()))
    }
}

/// Synthesizer that "encodes" text as its UTF-8 bytes
#[derive(Default)]
pub struct EchoSynthesizer {
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if self.fail {
            return Err(Error::Tts("quota exceeded".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Home control sink recording each call; listed services fail
#[derive(Default)]
pub struct RecordingHome {
    pub calls: Mutex<Vec<(ServiceCall, Value)>>,
    pub failing: HashSet<String>,
}

impl RecordingHome {
    pub fn failing_on(services: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: services.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn services(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| format!("{}/{}", call.domain, call.service))
            .collect()
    }
}

#[async_trait]
impl DirectiveSink for RecordingHome {
    async fn call_service(&self, call: &ServiceCall, payload: &Value) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((call.clone(), payload.clone()));
        if self.failing.contains(&call.service) {
            return Err(Error::Directive(format!("{} returned 500", call.service)));
        }
        Ok(())
    }
}

/// Fakes wired together, with handles kept for assertions
pub struct Fakes {
    pub stt: Arc<ScriptedTranscriber>,
    pub dialog: Arc<ScriptedDialog>,
    pub tts: Arc<EchoSynthesizer>,
    pub home: Arc<RecordingHome>,
}

impl Fakes {
    pub fn new(stt: Arc<ScriptedTranscriber>, dialog: Arc<ScriptedDialog>) -> Self {
        Self {
            stt,
            dialog,
            tts: Arc::new(EchoSynthesizer::default()),
            home: Arc::new(RecordingHome::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            stt: self.stt.clone(),
            dialog: self.dialog.clone(),
            tts: self.tts.clone(),
            home: self.home.clone(),
        }
    }
}
