use crate::error::{LivesubError, Result};

/// One transcript event from the recognition backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    /// True when the backend considers this utterance's transcript settled.
    pub is_final: bool,
}

/// Lazily produced sequence of outbound audio blocks for one exchange.
pub type AudioBlocks = Box<dyn Iterator<Item = Vec<u8>> + Send>;

/// Inbound transcript events for one exchange. The sequence ends when the
/// exchange closes; an `Err` item aborts the exchange.
pub type TranscriptEvents = Box<dyn Iterator<Item = Result<TranscriptEvent>> + Send>;

/// Trait for streaming speech-recognition backends.
///
/// This trait allows swapping implementations (remote service vs mock).
/// One call corresponds to one bidirectional exchange: the backend pulls
/// the audio blocks at its own pace (typically from a sender thread of its
/// own) while the caller iterates the returned events.
pub trait SpeechBackend: Send + Sync {
    fn streaming_recognize(&self, audio: AudioBlocks) -> Result<TranscriptEvents>;
}

/// Mock backend for testing.
///
/// Consumes the audio sequence eagerly, records the received blocks, and
/// replays a configured script of events.
pub struct MockBackend {
    events: Vec<TranscriptEvent>,
    received: std::sync::Mutex<Vec<Vec<u8>>>,
    exchanges: std::sync::atomic::AtomicUsize,
    should_fail_open: bool,
    should_fail_mid_stream: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            received: std::sync::Mutex::new(Vec::new()),
            exchanges: std::sync::atomic::AtomicUsize::new(0),
            should_fail_open: false,
            should_fail_mid_stream: false,
        }
    }

    /// Configure the events replayed on each exchange.
    pub fn with_events(mut self, events: Vec<TranscriptEvent>) -> Self {
        self.events = events;
        self
    }

    /// Configure the mock to fail when opening an exchange.
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }

    /// Configure the mock to fail after the first replayed event.
    pub fn with_mid_stream_failure(mut self) -> Self {
        self.should_fail_mid_stream = true;
        self
    }

    /// All audio blocks received so far, across exchanges, in order.
    pub fn received_blocks(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Concatenation of every received block.
    pub fn received_bytes(&self) -> Vec<u8> {
        self.received_blocks().concat()
    }

    /// Number of exchanges opened.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechBackend for MockBackend {
    fn streaming_recognize(&self, audio: AudioBlocks) -> Result<TranscriptEvents> {
        if self.should_fail_open {
            return Err(LivesubError::Backend {
                message: "mock backend refused the exchange".to_string(),
            });
        }
        self.exchanges
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        // Drain the outbound sequence the way a real client's sender loop
        // would, recording everything for assertions.
        {
            let mut received = self.received.lock().unwrap_or_else(|e| e.into_inner());
            for block in audio {
                received.push(block);
            }
        }

        let mut items: Vec<Result<TranscriptEvent>> = Vec::new();
        for (i, event) in self.events.iter().cloned().enumerate() {
            items.push(Ok(event));
            if self.should_fail_mid_stream && i == 0 {
                items.push(Err(LivesubError::Backend {
                    message: "mock backend dropped the exchange".to_string(),
                }));
                break;
            }
        }

        Ok(Box::new(items.into_iter()))
    }
}
