//! Audio segmentation pipeline: ingest queue → pre-roll history →
//! voice-activity gate → stream assembler.

pub mod assembler;
pub mod chunk;
pub mod gate;
pub mod history;
pub mod ingest;

pub use assembler::{AssembledUnits, StreamAssembler};
pub use chunk::AudioChunk;
pub use gate::{GateState, VoiceGate};
pub use history::PreactiveHistory;
pub use ingest::{IngestReceiver, IngestSender};
