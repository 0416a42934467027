//! Worker thread decoupling gate evaluation from blocking transmission.
//!
//! The gate produces lazily, one chunk per pull, on whatever thread pulls
//! it; the outbound exchange blocks on network I/O. The assembler bridges
//! the two: a worker thread drains the gate as fast as it produces and
//! republishes into a second queue, and the consumer side blocks for at
//! least one item, then opportunistically takes everything queued behind it
//! and concatenates the lot, byte-for-byte in arrival order, into a single
//! transmit unit. Chunks are never reordered or dropped.
//!
//! Any upstream failure surfaces as sequence exhaustion — the assembler
//! relays, it does not retry. When the worker finishes it hands the gate's
//! carried state (source and look-back history) back to the driver.

use crate::defaults;
use crate::pipeline::chunk::AudioChunk;
use crate::pipeline::gate::VoiceGate;
use crate::pipeline::history::PreactiveHistory;
use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

pub struct StreamAssembler<S> {
    worker: JoinHandle<(S, PreactiveHistory)>,
}

impl<S> StreamAssembler<S>
where
    S: Iterator<Item = AudioChunk> + Send + 'static,
{
    /// Spawns the worker and returns it with the consumer-side sequence.
    pub fn spawn(gate: VoiceGate<S>) -> (Self, AssembledUnits) {
        let (tx, rx) = unbounded::<Option<Vec<u8>>>();

        let worker = thread::spawn(move || {
            let mut gate = gate;
            for chunk in gate.by_ref() {
                if tx.send(Some(chunk.into_bytes())).is_err() {
                    // Consumer went away mid-utterance; stop pulling.
                    break;
                }
            }
            let _ = tx.send(None);
            gate.into_parts()
        });

        (
            Self { worker },
            AssembledUnits {
                rx,
                finished: false,
            },
        )
    }

    /// Waits for the worker with a bounded poll, returning the gate's
    /// source and history, or `None` if the worker did not finish in time
    /// (it is detached and dies with its channel).
    pub fn join(self, timeout: Duration) -> Option<(S, PreactiveHistory)> {
        let deadline = Instant::now() + timeout;
        while !self.worker.is_finished() {
            if Instant::now() >= deadline {
                warn!("assembler worker did not finish in time, detaching");
                return None;
            }
            thread::sleep(defaults::POLL_INTERVAL);
        }
        self.worker.join().ok()
    }
}

/// Consumer side: each `next()` yields one transmit unit.
pub struct AssembledUnits {
    rx: Receiver<Option<Vec<u8>>>,
    finished: bool,
}

impl Iterator for AssembledUnits {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }

        // Block for at least one item.
        let mut unit = match self.rx.recv() {
            Ok(Some(bytes)) => bytes,
            Ok(None) | Err(_) => {
                self.finished = true;
                return None;
            }
        };

        // Then take whatever else is already queued.
        loop {
            match self.rx.try_recv() {
                Ok(Some(bytes)) => unit.extend_from_slice(&bytes),
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }

        Some(unit)
    }
}
