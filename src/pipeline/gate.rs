//! Voice-activity gate: hysteresis filter over the raw chunk stream.
//!
//! A single-pass pull filter. Pulling the gate pulls the underlying source;
//! only the chunks belonging to one detected utterance come out, with the
//! pre-roll history prepended and brief dips absorbed. Two counters shape
//! the hysteresis:
//!
//! - `pause_frames`: silent chunks absorbed before emission is suspended,
//! - `off_frames`: silent chunks that close the utterance for good.
//!
//! The onset and release thresholds are separate so the open and close
//! amplitudes can be tuned independently against boundary chatter.

use crate::config::GateConfig;
use crate::pipeline::chunk::AudioChunk;
use crate::pipeline::history::PreactiveHistory;
use std::collections::VecDeque;
use std::fmt;

/// Gate phase, published to observers as it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No utterance yet; chunks are discarded into the look-back buffer.
    Wait,
    /// Onset detected; pre-roll is being replayed. Transient: entered and
    /// left within a single evaluation.
    Preactive,
    /// Inside an utterance; chunks flow through.
    Active,
    /// Inside an utterance but past the pause tolerance; chunks are held
    /// back and either flushed when the voice returns or discarded at close.
    Silence,
    /// The utterance is closed; the gate yields nothing further.
    End,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Wait => "WAIT",
            GateState::Preactive => "PREACTIVE",
            GateState::Active => "ACTIVE",
            GateState::Silence => "SILENCE",
            GateState::End => "END",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type StateObserver = Box<dyn FnMut(GateState) + Send>;

/// One utterance's worth of gating over a chunk source.
///
/// The gate owns its source and look-back history for the duration of a
/// pass; `into_parts` hands both back so the next pass continues the same
/// stream with the same accumulated pre-roll.
pub struct VoiceGate<S> {
    source: S,
    config: GateConfig,
    history: PreactiveHistory,
    state: GateState,
    silence_count: u32,
    /// Chunks ready to be yielded (pre-roll replay, dip flushes).
    pending: VecDeque<AudioChunk>,
    /// Silent chunks held back past the pause tolerance.
    dip_buffer: VecDeque<AudioChunk>,
    observer: Option<StateObserver>,
}

impl<S: Iterator<Item = AudioChunk>> VoiceGate<S> {
    pub fn new(source: S, mut history: PreactiveHistory, config: GateConfig) -> Self {
        history.set_capacity(config.preactive_frames);
        Self {
            source,
            config,
            history,
            state: GateState::Wait,
            silence_count: 0,
            pending: VecDeque::new(),
            dip_buffer: VecDeque::new(),
            observer: None,
        }
    }

    /// Registers a callback invoked on every state transition.
    pub fn with_observer(mut self, observer: impl FnMut(GateState) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Releases the source and history for the next pass.
    pub fn into_parts(self) -> (S, PreactiveHistory) {
        (self.source, self.history)
    }

    fn set_state(&mut self, state: GateState) {
        if self.state != state {
            self.state = state;
            if let Some(observer) = self.observer.as_mut() {
                observer(state);
            }
        }
    }

    /// Feeds one chunk through the state machine, queueing any emissions.
    fn admit(&mut self, chunk: AudioChunk) {
        let range = chunk.amplitude_range();

        match self.state {
            GateState::Wait => {
                if range >= self.config.onset_volume {
                    self.set_state(GateState::Preactive);
                    self.pending.extend(self.history.drain());
                    self.pending.push_back(chunk.clone());
                    self.history.push(chunk);
                    self.set_state(GateState::Active);
                } else {
                    self.history.push(chunk);
                }
            }
            GateState::Active | GateState::Silence => {
                self.history.push(chunk.clone());

                if range < self.config.release_volume {
                    self.silence_count += 1;
                } else {
                    self.silence_count = 0;
                }

                if self.silence_count < self.config.pause_frames {
                    // Still speaking, or a dip short enough to absorb:
                    // release anything held back, then the chunk itself.
                    self.set_state(GateState::Active);
                    self.pending.append(&mut self.dip_buffer);
                    self.pending.push_back(chunk);
                } else if self.silence_count < self.config.off_frames {
                    self.set_state(GateState::Silence);
                    self.dip_buffer.push_back(chunk);
                } else {
                    // Sustained silence: close the utterance, discarding the
                    // held-back tail.
                    self.dip_buffer.clear();
                    self.set_state(GateState::End);
                }
            }
            GateState::Preactive | GateState::End => {
                // Preactive never survives an evaluation; End admits nothing.
            }
        }
    }
}

impl<S: Iterator<Item = AudioChunk>> Iterator for VoiceGate<S> {
    type Item = AudioChunk;

    fn next(&mut self) -> Option<AudioChunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            if self.state == GateState::End {
                return None;
            }
            match self.source.next() {
                Some(chunk) => self.admit(chunk),
                None => {
                    // Upstream ended (terminal marker or producer gone):
                    // whatever was held back never gets emitted.
                    self.dip_buffer.clear();
                    self.set_state(GateState::End);
                    return None;
                }
            }
        }
    }
}
