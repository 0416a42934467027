//! Default configuration constants for livesub.
//!
//! Shared constants used across configuration types to ensure consistency
//! and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture chunk (100ms at 16kHz).
pub const CHUNK_SAMPLES: usize = (SAMPLE_RATE / 10) as usize;

/// Default onset threshold: amplitude range (max−min over a chunk's samples)
/// at or above which the voice gate opens.
pub const ONSET_VOLUME: i32 = 5000;

/// Default release threshold: amplitude range below which a chunk counts as
/// silence once the gate is open. Kept separate from the onset threshold so
/// the two can be tuned asymmetrically against boundary chatter.
pub const RELEASE_VOLUME: i32 = 5000;

/// Consecutive silent chunks tolerated inside an utterance before emission
/// is suspended (short-gap tolerance).
pub const PAUSE_FRAMES: u32 = 5;

/// Consecutive silent chunks that close an utterance.
pub const OFF_FRAMES: u32 = 15;

/// Chunks of pre-roll kept for replay when an utterance begins.
pub const PREACTIVE_FRAMES: usize = 5;

/// Default recognition language code.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default recognition backend address.
pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:9630";

/// How long an HTTP long-poll request is held open waiting for a change.
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the pipeline worker to wind down on disable.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Polling interval for bounded waits on worker threads.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
