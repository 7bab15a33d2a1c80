//! Configuration management for homevoice
//!
//! Built once at startup and passed by reference into each component.
//! Precedence: process environment > `.env` files > TOML file > defaults.

pub mod env_file;
pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::voice::AudioFormat;
use crate::{Error, Result};

use file::ConfigFile;

/// Default trigger phrase
pub const DEFAULT_WAKE_WORD: &str = "megatron";

/// Default OpenAI-compatible endpoint for chat and transcription
pub const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";

/// Default `ElevenLabs` endpoint
pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1";

/// Default Home Assistant base URL
pub const DEFAULT_HA_URL: &str = "http://192.168.1.210:8123";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "moonshotai/kimi-k2-instruct";

/// Default `ElevenLabs` voice
pub const DEFAULT_VOICE_ID: &str = "YOq2y2Up4RgXP2HyXjE5";

/// Mixer controls adjusted when a gain table is configured without controls
const DEFAULT_GAIN_CONTROLS: [&str; 2] = ["Capture", "ADC PCM"];

/// Complete assistant configuration
#[derive(Debug)]
pub struct Config {
    /// Wake phrase spotting
    pub wake: WakeConfig,

    /// Microphone capture and voice-activity gating
    pub capture: CaptureConfig,

    /// Speaker output
    pub playback: PlaybackConfig,

    /// Speech-to-text service
    pub stt: SttConfig,

    /// Chat completion service and history policy
    pub dialog: DialogConfig,

    /// Speech synthesis service
    pub tts: TtsConfig,

    /// Home Assistant control API
    pub home: HomeConfig,
}

/// Wake phrase configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Lowercase trigger phrase
    pub phrase: String,

    /// Length of each non-overlapping check window
    pub window: Duration,

    /// Trailing text longer than this many characters is run as an inline command
    pub inline_min_chars: usize,

    /// Domain hint for the fast decoding profile
    pub hint: String,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Input device name, default device when `None`
    pub device: Option<String>,

    /// Samples per second per channel
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Frames per block
    pub block_size: usize,

    /// RMS energy below which a block is silent
    pub silence_threshold: f32,

    /// Consecutive silence that ends a recording
    pub silence_duration: Duration,

    /// Hard cap on recording length
    pub max_duration: Duration,

    /// Domain hint for the accurate decoding profile
    pub hint: String,

    /// Mixer gain applied at startup
    pub gain: Option<MicGain>,
}

impl CaptureConfig {
    /// Block format produced by the capture device
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            block_size: self.block_size,
        }
    }
}

/// ALSA mixer gain settings
#[derive(Debug, Clone)]
pub struct MicGain {
    /// Sound card index
    pub card: u32,

    /// Gain percentage
    pub percent: u8,

    /// Mixer controls to set
    pub controls: Vec<String>,
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Output device name, default device when `None`
    pub device: Option<String>,

    /// Frequency of the "start speaking" cue
    pub cue_frequency: f32,

    /// Length of the cue
    pub cue_duration: Duration,
}

/// Speech-to-text configuration
#[derive(Debug)]
pub struct SttConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Bearer token
    pub api_key: SecretString,

    /// Model used for the fast profile (wake checks)
    pub fast_model: String,

    /// Model used for the accurate profile (utterances)
    pub accurate_model: String,

    /// Spoken language
    pub language: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Dialog exchange configuration
#[derive(Debug)]
pub struct DialogConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Bearer token
    pub api_key: SecretString,

    /// Chat model
    pub model: String,

    /// Completion token limit
    pub max_tokens: u32,

    /// Most recent turns sent with each request
    pub context_turns: usize,

    /// Turns kept in memory before the oldest are evicted
    pub history_capacity: usize,

    /// System prompt prepended to every request
    pub system_prompt: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Speech synthesis configuration
#[derive(Debug)]
pub struct TtsConfig {
    /// `ElevenLabs` base URL
    pub base_url: String,

    /// `xi-api-key` header value
    pub api_key: SecretString,

    /// Voice identifier
    pub voice_id: String,

    /// Synthesis model
    pub model: String,

    /// Voice stability (0.0 - 1.0)
    pub stability: f32,

    /// Similarity boost (0.0 - 1.0)
    pub similarity_boost: f32,

    /// Speaking rate multiplier
    pub speed: f32,

    /// Request timeout
    pub timeout: Duration,
}

/// Home Assistant configuration
#[derive(Debug)]
pub struct HomeConfig {
    /// Base URL of the Home Assistant instance
    pub base_url: Url,

    /// Long-lived access token
    pub token: Option<SecretString>,

    /// Request timeout per service call
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from the standard sources
    ///
    /// An explicit `path` must exist and parse; the default config file is optional.
    ///
    /// # Errors
    ///
    /// Returns error if required credentials are missing or values are invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        let dotenv = env_file::load_default_env_files();

        Self::from_sources(fc, |key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Load only the audio device settings, without requiring credentials
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or audio values are invalid
    pub fn load_audio(path: Option<&Path>) -> Result<(CaptureConfig, PlaybackConfig)> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        let dotenv = env_file::load_default_env_files();
        let env = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| dotenv.get(key).cloned())
        };

        Ok((
            capture_config(fc.capture, &env)?,
            playback_config(fc.playback, &env)?,
        ))
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if required credentials are missing or values are invalid
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Credentials (env > toml), required ones checked before anything else
        let groq_key = env("GROQ_API_KEY")
            .or(fc.api_keys.groq)
            .ok_or_else(|| Error::Config("GROQ_API_KEY not set".to_string()))?;
        let elevenlabs_key = env("ELEVENLABS_API_KEY")
            .or(fc.api_keys.elevenlabs)
            .ok_or_else(|| Error::Config("ELEVENLABS_API_KEY not set".to_string()))?;
        let stt_key = env("HOMEVOICE_STT_API_KEY")
            .or(fc.api_keys.stt)
            .unwrap_or_else(|| groq_key.clone());

        // Wake (env > toml > default)
        let phrase = env("HOMEVOICE_WAKE_WORD")
            .or(fc.wake.phrase)
            .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string())
            .trim()
            .to_lowercase();
        if phrase.is_empty() {
            return Err(Error::Config("wake phrase must not be empty".to_string()));
        }
        let display_name = capitalize(&phrase);
        let wake = WakeConfig {
            window: seconds(fc.wake.window_secs.unwrap_or(2.0), "wake.window_secs")?,
            inline_min_chars: fc.wake.inline_min_chars.unwrap_or(3),
            hint: fc
                .wake
                .hint
                .unwrap_or_else(|| format!("Voice commands. Wake word is {display_name}.")),
            phrase,
        };

        let capture = capture_config(fc.capture, &env)?;
        let playback = playback_config(fc.playback, &env)?;

        let stt = SttConfig {
            base_url: fc
                .stt
                .base_url
                .unwrap_or_else(|| DEFAULT_GROQ_URL.to_string()),
            api_key: SecretString::from(stt_key),
            fast_model: fc
                .stt
                .fast_model
                .unwrap_or_else(|| "whisper-large-v3-turbo".to_string()),
            accurate_model: fc
                .stt
                .accurate_model
                .unwrap_or_else(|| "whisper-large-v3".to_string()),
            language: fc.stt.language.unwrap_or_else(|| "en".to_string()),
            timeout: Duration::from_secs(fc.stt.timeout_secs.unwrap_or(30)),
        };

        // System prompt (env file > toml file > toml inline > default)
        let prompt_file = env("HOMEVOICE_SYSTEM_PROMPT_FILE")
            .map(std::path::PathBuf::from)
            .or(fc.llm.system_prompt_file);
        let system_prompt = match prompt_file {
            Some(path) => {
                let prompt = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!(
                        "failed to read system prompt {}: {e}",
                        path.display()
                    ))
                })?;
                tracing::debug!(path = %path.display(), "loaded system prompt");
                prompt
            }
            None => fc
                .llm
                .system_prompt
                .unwrap_or_else(|| default_system_prompt(&display_name)),
        };

        let dialog = DialogConfig {
            base_url: fc
                .llm
                .base_url
                .unwrap_or_else(|| DEFAULT_GROQ_URL.to_string()),
            api_key: SecretString::from(groq_key),
            model: env("HOMEVOICE_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            max_tokens: fc.llm.max_tokens.unwrap_or(400),
            context_turns: fc.llm.context_turns.unwrap_or(10),
            history_capacity: fc.llm.history_capacity.unwrap_or(200),
            system_prompt,
            timeout: Duration::from_secs(fc.llm.timeout_secs.unwrap_or(30)),
        };
        if dialog.history_capacity < dialog.context_turns {
            return Err(Error::Config(
                "llm.history_capacity must be at least llm.context_turns".to_string(),
            ));
        }

        let tts = TtsConfig {
            base_url: fc
                .tts
                .base_url
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_URL.to_string()),
            api_key: SecretString::from(elevenlabs_key),
            voice_id: env("ELEVENLABS_VOICE_ID")
                .or(fc.tts.voice_id)
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            model: fc
                .tts
                .model
                .unwrap_or_else(|| "eleven_flash_v2_5".to_string()),
            stability: fc.tts.stability.unwrap_or(0.5),
            similarity_boost: fc.tts.similarity_boost.unwrap_or(0.75),
            speed: fc.tts.speed.unwrap_or(1.15),
            timeout: Duration::from_secs(fc.tts.timeout_secs.unwrap_or(30)),
        };

        let home_url = env("HA_URL")
            .or(fc.home_assistant.url)
            .unwrap_or_else(|| DEFAULT_HA_URL.to_string());
        let home = HomeConfig {
            base_url: Url::parse(&home_url)?,
            token: env("HA_ACCESS_TOKEN")
                .or(fc.home_assistant.token)
                .map(SecretString::from),
            timeout: Duration::from_secs(fc.home_assistant.timeout_secs.unwrap_or(5)),
        };

        Ok(Self {
            wake,
            capture,
            playback,
            stt,
            dialog,
            tts,
            home,
        })
    }
}

/// Capture settings (env > toml > default)
fn capture_config(
    fc: file::CaptureFileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<CaptureConfig> {
    let capture = CaptureConfig {
        device: env("HOMEVOICE_INPUT_DEVICE").or(fc.device),
        sample_rate: fc.sample_rate.unwrap_or(16_000),
        channels: fc.channels.unwrap_or(2),
        block_size: fc.block_size.unwrap_or(512),
        silence_threshold: parse_value(
            "HOMEVOICE_SILENCE_THRESHOLD",
            env("HOMEVOICE_SILENCE_THRESHOLD"),
        )
        .or(fc.silence_threshold)
        .unwrap_or(300.0),
        silence_duration: seconds(fc.silence_secs.unwrap_or(2.0), "capture.silence_secs")?,
        max_duration: seconds(fc.max_record_secs.unwrap_or(12.0), "capture.max_record_secs")?,
        hint: fc
            .hint
            .unwrap_or_else(|| "Smart home voice commands. Clear speech.".to_string()),
        gain: fc.gain.map(|g| MicGain {
            card: g.card,
            percent: g.percent.min(100),
            controls: g.controls.unwrap_or_else(|| {
                DEFAULT_GAIN_CONTROLS.iter().map(ToString::to_string).collect()
            }),
        }),
    };

    if capture.sample_rate == 0 || capture.channels == 0 || capture.block_size == 0 {
        return Err(Error::Config(
            "capture sample_rate, channels and block_size must be positive".to_string(),
        ));
    }

    Ok(capture)
}

/// Playback settings (env > toml > default)
fn playback_config(
    fc: file::PlaybackFileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<PlaybackConfig> {
    Ok(PlaybackConfig {
        device: env("HOMEVOICE_OUTPUT_DEVICE").or(fc.device),
        cue_frequency: fc.cue_frequency.unwrap_or(880.0),
        cue_duration: seconds(fc.cue_secs.unwrap_or(0.2), "playback.cue_secs")?,
    })
}

/// Parse a numeric value, logging and ignoring malformed input
pub fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed config value");
            None
        }
    }
}

/// Convert positive seconds to a duration
fn seconds(value: f64, key: &str) -> Result<Duration> {
    if value.is_finite() && value > 0.0 {
        Ok(Duration::from_secs_f64(value))
    } else {
        Err(Error::Config(format!("{key} must be a positive number of seconds")))
    }
}

/// Uppercase the first character ("megatron" -> "Megatron")
#[must_use]
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Built-in system prompt describing the home control tag
fn default_system_prompt(name: &str) -> String {
    format!(
        r#"You are {name}, a voice assistant running on a small home server.
Keep responses brief and natural, spoken aloud, 1-2 sentences max unless more is needed.

CRITICAL RULES:
- NEVER speak entity IDs, service names, JSON, or any technical details aloud.
- Your spoken reply must sound natural, like a human assistant confirming an action.
- Good: "Done, hallway lights are off." Bad: "Calling service light.turn_off on entity light.hallway."

When controlling devices, output the command tag FIRST (silent, never read aloud), then your natural spoken reply:
<HA_COMMAND>{{"service": "light.turn_off", "entity_id": "light.hallway"}}</HA_COMMAND>
Done, hallway lights are off.

Extra service parameters go in a "data" object:
<HA_COMMAND>{{"service": "light.turn_on", "entity_id": "light.bedroom", "data": {{"brightness_pct": 40}}}}</HA_COMMAND>

Multiple commands allowed. Spoken reply goes AFTER all command tags, always natural language only.
"#
    )
}
