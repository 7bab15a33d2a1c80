//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::block::AudioWindow;
use super::capture::window_to_wav;
use crate::config::SttConfig;
use crate::{Error, Result};

/// Decoding profile for a transcription request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingProfile {
    /// Lightweight model used for wake checks
    Fast,
    /// More accurate model used for captured utterances
    Accurate,
}

impl DecodingProfile {
    /// Short name for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }
}

/// Converts audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a mono window with the given profile and domain hint
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(
        &self,
        window: &AudioWindow,
        profile: DecodingProfile,
        hint: &str,
    ) -> Result<String>;
}

/// Transcribe, treating any failure as silence
///
/// Library and service errors degrade to an empty transcript.
pub async fn transcribe_or_empty(
    stt: &dyn Transcriber,
    window: &AudioWindow,
    profile: DecodingProfile,
    hint: &str,
) -> String {
    if window.is_empty() {
        return String::new();
    }

    match stt.transcribe(window, profile, hint).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, profile = profile.as_str(), "transcription failed");
            String::new()
        }
    }
}

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Whisper transcription over an OpenAI-compatible HTTP API (Groq by default)
pub struct WhisperApi {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    fast_model: String,
    accurate_model: String,
    language: String,
}

impl WhisperApi {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new(config: &SttConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(Error::Config("STT API key required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(config.api_key.expose_secret().to_owned()),
            fast_model: config.fast_model.clone(),
            accurate_model: config.accurate_model.clone(),
            language: config.language.clone(),
        })
    }

    /// Model name used for a profile
    #[must_use]
    pub fn model_for(&self, profile: DecodingProfile) -> &str {
        match profile {
            DecodingProfile::Fast => &self.fast_model,
            DecodingProfile::Accurate => &self.accurate_model,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    async fn transcribe(
        &self,
        window: &AudioWindow,
        profile: DecodingProfile,
        hint: &str,
    ) -> Result<String> {
        let audio = window_to_wav(window)?;
        let model = self.model_for(profile).to_string();
        tracing::debug!(
            audio_bytes = audio.len(),
            model,
            profile = profile.as_str(),
            "starting transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", model)
            .text("language", self.language.clone())
            .text("temperature", "0")
            .text("response_format", "json")
            .text("prompt", hint.to_string());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("failed to parse transcription: {e}")))?;

        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
