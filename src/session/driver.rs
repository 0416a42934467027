//! Drives one streaming recognition exchange per detected utterance.
//!
//! The driver loops for as long as the pipeline is enabled and the process
//! is running: gate a pass of audio, skip the exchange entirely if the gate
//! produced nothing, otherwise stream the assembled units out and publish
//! every inbound transcript event. The backend is the single source of
//! truth for the current best transcript — events are published verbatim,
//! interim or final, with no local merging.

use crate::defaults;
use crate::error::{LivesubError, Result};
use crate::pipeline::{
    AssembledUnits, GateState, IngestReceiver, PreactiveHistory, StreamAssembler, VoiceGate,
};
use crate::runtime::{Runtime, keys};
use crate::stt::{AudioBlocks, SpeechBackend};
use std::sync::Arc;
use tracing::{debug, info};

pub struct SessionDriver {
    runtime: Arc<Runtime>,
    backend: Arc<dyn SpeechBackend>,
}

impl SessionDriver {
    pub fn new(runtime: Arc<Runtime>, backend: Arc<dyn SpeechBackend>) -> Self {
        Self { runtime, backend }
    }

    /// Runs the driver loop until the pipeline is disabled, the source is
    /// exhausted, or an unrecoverable error occurs.
    pub fn run(&self, mut source: IngestReceiver) -> Result<()> {
        let mut history = PreactiveHistory::new(self.runtime.gate_config().preactive_frames);

        while self.runtime.is_live() {
            // Thresholds are re-read per pass so config updates apply at
            // the next utterance boundary.
            let config = self.runtime.gate_config();
            self.runtime.update_status(keys::API_STATE, "WAIT");
            self.runtime
                .update_status(keys::VOL_STATE, GateState::Wait.as_str());

            let observer_runtime = Arc::clone(&self.runtime);
            let gate = VoiceGate::new(source, history, config).with_observer(move |state| {
                observer_runtime.update_status(keys::VOL_STATE, state.as_str())
            });
            let (assembler, mut units) = StreamAssembler::spawn(gate);

            debug!("listening for utterance");
            let first = units.next();
            let outcome = match first {
                Some(first) if self.runtime.is_live() => self.run_exchange(first, units),
                // Shutdown raced the onset; the pass's audio is dropped.
                Some(_) => Ok(()),
                // Gate never activated before the stream ended.
                None => Ok(()),
            };

            // Recover the source and look-back history for the next pass.
            match assembler.join(defaults::STOP_TIMEOUT) {
                Some((recovered_source, recovered_history)) => {
                    source = recovered_source;
                    history = recovered_history;
                }
                None => {
                    outcome?;
                    return Err(LivesubError::Pipeline {
                        message: "gate worker did not wind down; aborting run".to_string(),
                    });
                }
            }
            outcome?;

            if source.is_finished() {
                // Terminal marker observed: nothing more will arrive on
                // this queue. A re-enable constructs a fresh one.
                debug!("audio stream ended");
                break;
            }
        }

        Ok(())
    }

    fn run_exchange(&self, first: Vec<u8>, rest: AssembledUnits) -> Result<()> {
        self.runtime.update_status(keys::API_STATE, "ACTIVE");
        info!(bytes = first.len(), "opening streaming exchange");

        let outbound: AudioBlocks = Box::new(std::iter::once(first).chain(rest));
        let events = self.backend.streaming_recognize(outbound)?;

        for event in events {
            let event = event?;
            if !self.runtime.is_running() {
                break;
            }
            debug!(text = %event.text, is_final = event.is_final, "transcript event");
            self.runtime.update_text(&event.text);
        }

        self.runtime.update_status(keys::API_STATE, "END");
        info!("exchange closed");
        Ok(())
    }
}
