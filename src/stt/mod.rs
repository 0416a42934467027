//! Streaming speech-recognition boundary.

pub mod backend;
pub mod remote;

pub use backend::{AudioBlocks, MockBackend, SpeechBackend, TranscriptEvent, TranscriptEvents};
pub use remote::TcpBackend;
