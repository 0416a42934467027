//! Unbounded FIFO bridging the capture callback to the pipeline thread.
//!
//! The producer side never blocks; the consumer side blocks until an item
//! arrives. A terminal marker, once pushed, is the last item ever delivered:
//! pushes after shutdown are permitted but silently dropped once no consumer
//! remains.

use crate::pipeline::chunk::AudioChunk;
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Creates a connected ingest queue pair.
pub fn channel() -> (IngestSender, IngestReceiver) {
    let (tx, rx) = unbounded();
    (
        IngestSender { tx },
        IngestReceiver {
            rx,
            finished: false,
        },
    )
}

/// Producer handle; cheap to clone, safe to call from the capture callback.
#[derive(Clone)]
pub struct IngestSender {
    tx: Sender<Option<AudioChunk>>,
}

impl IngestSender {
    /// Enqueues a chunk. Returns false if the consumer is gone.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        self.tx.send(Some(chunk)).is_ok()
    }

    /// Enqueues the terminal marker. Returns false if the consumer is gone.
    pub fn close(&self) -> bool {
        self.tx.send(None).is_ok()
    }
}

/// Consumer handle. Single owner; iteration ends at the terminal marker or
/// when every producer has been dropped.
pub struct IngestReceiver {
    rx: Receiver<Option<AudioChunk>>,
    finished: bool,
}

impl IngestReceiver {
    /// Blocks until a chunk is available.
    ///
    /// Returns `None` once the terminal marker has been observed or all
    /// senders are gone; the end state is sticky, so chunks pushed after the
    /// terminal marker are never delivered.
    pub fn recv(&mut self) -> Option<AudioChunk> {
        if self.finished {
            return None;
        }
        match self.rx.recv() {
            Ok(Some(chunk)) => Some(chunk),
            Ok(None) | Err(_) => {
                self.finished = true;
                None
            }
        }
    }

    /// True once the terminal marker has been observed (or every producer
    /// is gone); no further chunk will ever be delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for IngestReceiver {
    type Item = AudioChunk;

    fn next(&mut self) -> Option<AudioChunk> {
        self.recv()
    }
}
