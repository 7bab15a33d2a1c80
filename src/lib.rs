//! Homevoice - wake-word voice assistant for Home Assistant
//!
//! This library provides the core functionality for the assistant:
//! - Continuous wake word spotting over a live microphone stream
//! - Voice-activity gated utterance capture
//! - Turn orchestration: STT, dialog exchange, home-control directives,
//!   TTS and playback, with automatic follow-up on questions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ fixed-size blocks
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Daemon                            │
//! │   Wake Spotter  │  Utterance Recorder  │  Turns     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               External services                      │
//! │   Whisper STT  │  Chat LLM  │  ElevenLabs  │  HA    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod dialog;
pub mod directive;
pub mod error;
pub mod turn;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
