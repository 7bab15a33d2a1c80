//! Voice processing module
//!
//! Handles audio capture, wake word spotting, utterance recording,
//! speech-to-text, text-to-speech and playback.

mod block;
mod capture;
mod energy;
mod playback;
mod recorder;
mod stt;
mod tts;
mod wake_word;

pub use block::{AudioBlock, AudioFormat, AudioWindow};
pub use capture::{AudioSource, MicrophoneSource, apply_mic_gain, window_to_wav};
pub use energy::rms_energy;
pub use playback::{AudioSink, SpeakerPlayback, cue_tone, decode_mp3};
pub use recorder::{GateDecision, Recording, SilenceGate, StopReason, UtteranceRecorder};
pub use stt::{DecodingProfile, Transcriber, WhisperApi, transcribe_or_empty};
pub use tts::{ElevenLabs, SpeechSynthesizer};
pub use wake_word::{SpotterState, WakeOutcome, WakeSpotter};
