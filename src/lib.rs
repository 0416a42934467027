//! livesub - Live subtitles from streaming speech recognition
//!
//! Continuously captures microphone audio, gates it through a
//! voice-activity state machine, streams detected utterances to a
//! recognition backend and publishes transcripts to HTTP long-poll
//! observers.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod session;
pub mod stt;
pub mod web;

// Core traits (capture → gate → recognize)
pub use audio::{CaptureOpener, CaptureSource};
pub use stt::SpeechBackend;

// Pipeline
pub use pipeline::{AudioChunk, GateState, PreactiveHistory, StreamAssembler, VoiceGate};

// Shared state and lifecycle
pub use runtime::{LifecycleController, Runtime};

// Error handling
pub use error::{LivesubError, Result};

// Config
pub use config::{Config, GateConfig, GateConfigPatch};

/// Build version string with optional git commit hash.
///
/// Returns `"0.2.1+abc1234"` when git hash is available, `"0.2.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
