//! TOML configuration file loading
//!
//! Supports `~/.config/homevoice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Wake phrase spotting
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Microphone capture and voice-activity gating
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Speaker output
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Speech-to-text service
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Chat completion service
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis service
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Home Assistant control API
    #[serde(default)]
    pub home_assistant: HomeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Trigger phrase (e.g. "megatron")
    pub phrase: Option<String>,

    /// Length of each non-overlapping wake check window, in seconds
    pub window_secs: Option<f64>,

    /// Trailing text longer than this is treated as an inline command
    pub inline_min_chars: Option<usize>,

    /// Domain hint passed to the fast decoding profile
    pub hint: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Input device name (default device when absent)
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Frames per block
    pub block_size: Option<usize>,
    /// RMS energy below which a block counts as silence
    pub silence_threshold: Option<f32>,
    pub silence_secs: Option<f64>,
    pub max_record_secs: Option<f64>,
    /// Domain hint passed to the accurate decoding profile
    pub hint: Option<String>,
    /// Mixer gain applied at startup
    pub gain: Option<GainFileConfig>,
}

/// ALSA mixer gain applied via `amixer`
#[derive(Debug, Deserialize)]
pub struct GainFileConfig {
    pub card: u32,
    pub percent: u8,
    pub controls: Option<Vec<String>>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Output device name (default device when absent)
    pub device: Option<String>,
    pub cue_frequency: Option<f32>,
    pub cue_secs: Option<f64>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// OpenAI-compatible base URL (e.g. `https://api.groq.com/openai/v1`)
    pub base_url: Option<String>,
    /// Model used for wake checks
    pub fast_model: Option<String>,
    /// Model used for captured utterances
    pub accurate_model: Option<String>,
    pub language: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,
    /// Model identifier (e.g. "moonshotai/kimi-k2-instruct")
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    /// Number of most recent turns sent with each request
    pub context_turns: Option<usize>,
    /// Number of turns kept in memory
    pub history_capacity: Option<usize>,
    /// Inline system prompt
    pub system_prompt: Option<String>,
    /// File to read the system prompt from
    pub system_prompt_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub base_url: Option<String>,
    pub voice_id: Option<String>,
    pub model: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub speed: Option<f32>,
    pub timeout_secs: Option<u64>,
}

/// Home Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct HomeFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub groq: Option<String>,
    pub stt: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Read and parse a specific config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config directory: `~/.config/homevoice`
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("homevoice"))
}

/// Return the config file path: `~/.config/homevoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
