//! Pipeline lifecycle: enable/disable orchestration.
//!
//! `enable` and `disable` are idempotent and serialized under the shared
//! monitor lock; at most one pipeline worker exists at a time. A disable
//! never force-kills the worker: it clears the enabled flag, pushes the
//! terminal marker to unblock a parked consumer, and waits with a bounded
//! poll so a concurrent fatal shutdown can still get through.

use crate::audio::CaptureOpener;
use crate::defaults;
use crate::pipeline::ingest;
use crate::runtime::{Runtime, keys};
use crate::session::SessionDriver;
use crate::stt::SpeechBackend;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct LifecycleController {
    runtime: Arc<Runtime>,
    opener: Arc<dyn CaptureOpener>,
    backend: Arc<dyn SpeechBackend>,
}

impl LifecycleController {
    pub fn new(
        runtime: Arc<Runtime>,
        opener: Arc<dyn CaptureOpener>,
        backend: Arc<dyn SpeechBackend>,
    ) -> Self {
        Self {
            runtime,
            opener,
            backend,
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Starts the pipeline worker if it is not already running.
    pub fn enable(&self) {
        {
            let mut shared = self.runtime.lock();
            if shared.worker.is_some() {
                debug!("enable: pipeline already running");
                return;
            }

            shared.set_status(keys::OPERATION, "> ON");
            shared.enabled = true;

            let (ingest_tx, ingest_rx) = ingest::channel();
            shared.ingest = Some(ingest_tx.clone());

            let runtime = Arc::clone(&self.runtime);
            let opener = Arc::clone(&self.opener);
            let backend = Arc::clone(&self.backend);
            let handle = thread::spawn(move || {
                pipeline_worker(runtime, opener, backend, ingest_tx, ingest_rx);
            });
            shared.worker = Some(handle);
            self.runtime.notify_all();
        }

        // Published outside the first critical section so observers can see
        // the transitional state; skipped if a disable won the race.
        let mut shared = self.runtime.lock();
        if shared.enabled {
            shared.set_status(keys::OPERATION, "ON");
            self.runtime.notify_all();
            drop(shared);
            info!("pipeline enabled");
        }
    }

    /// Stops the pipeline worker and waits for it to wind down.
    pub fn disable(&self) {
        let worker = {
            let mut shared = self.runtime.lock();
            shared.set_status(keys::OPERATION, "> OFF");
            shared.enabled = false;
            if let Some(ingest) = shared.ingest.take() {
                // Unblocks a consumer parked on the queue.
                ingest.close();
            }
            let worker = shared.worker.take();
            self.runtime.notify_all();
            worker
        };

        if let Some(handle) = worker {
            // Bounded poll instead of a blocking join: a fatal error
            // elsewhere must still be able to unwind this controller.
            let deadline = Instant::now() + defaults::STOP_TIMEOUT;
            loop {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        error!("pipeline worker panicked");
                    }
                    break;
                }
                if Instant::now() >= deadline {
                    warn!("pipeline worker did not stop in time, detaching");
                    break;
                }
                if !self.runtime.is_running() {
                    break;
                }
                thread::sleep(defaults::POLL_INTERVAL);
            }
        }

        self.runtime.update_status(keys::OPERATION, "OFF");
        info!("pipeline disabled");
    }
}

/// Body of the pipeline worker thread: opens the capture device, runs the
/// driver loop, and converts any error into the fatal shutdown signal.
fn pipeline_worker(
    runtime: Arc<Runtime>,
    opener: Arc<dyn CaptureOpener>,
    backend: Arc<dyn SpeechBackend>,
    ingest_tx: ingest::IngestSender,
    ingest_rx: ingest::IngestReceiver,
) {
    let result = (|| {
        let device_hash = runtime.device_hash();
        let mut opened = opener.open(&device_hash, ingest_tx)?;
        runtime.update_status(keys::AUDIO_INPUT_DEVICE, &opened.device_name);
        opened.source.start()?;
        info!(device = %opened.device_name, "audio capture started");

        let driver = SessionDriver::new(Arc::clone(&runtime), backend);
        let outcome = driver.run(ingest_rx);

        if let Err(e) = opened.source.stop() {
            warn!(error = %e, "audio capture stop failed");
        }
        outcome
    })();

    if let Err(e) = result {
        // Fail fast: no per-utterance retry. Observers see the cleared
        // running flag through the notification broadcast.
        error!(error = %e, "pipeline failed, shutting down");
        runtime.shutdown();
    }
    runtime.update_status(keys::API_STATE, "OFF");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockCaptureOpener;
    use crate::config::Config;
    use crate::pipeline::AudioChunk;
    use crate::stt::{MockBackend, TranscriptEvent};
    use std::time::Duration;

    fn controller_with(
        opener: MockCaptureOpener,
        backend: MockBackend,
    ) -> (LifecycleController, Arc<Runtime>, Arc<MockBackend>) {
        let runtime = Arc::new(Runtime::new(&Config::default()));
        let backend = Arc::new(backend);
        let controller = LifecycleController::new(
            Arc::clone(&runtime),
            Arc::new(opener),
            Arc::clone(&backend) as Arc<dyn SpeechBackend>,
        );
        (controller, runtime, backend)
    }

    fn loud() -> AudioChunk {
        AudioChunk::from_samples(&[-20000i16, 20000])
    }

    fn quiet() -> AudioChunk {
        AudioChunk::from_samples(&[0i16, 0])
    }

    fn wait_for_worker_exit(runtime: &Arc<Runtime>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let shared = runtime.lock();
                if let Some(worker) = shared.worker.as_ref() {
                    if worker.is_finished() {
                        break;
                    }
                } else {
                    break;
                }
            }
            assert!(Instant::now() < deadline, "worker did not exit in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_enable_is_idempotent() {
        // The mock capture pushes nothing and never closes, so the worker
        // parks on the queue until disable unblocks it.
        let (controller, runtime, _) =
            controller_with(MockCaptureOpener::new(), MockBackend::new());

        controller.enable();
        controller.enable();

        {
            let shared = runtime.lock();
            assert!(shared.worker.is_some());
            assert!(shared.enabled);
        }
        assert_eq!(
            runtime.status_snapshot().status.get("operation").unwrap(),
            "ON"
        );

        controller.disable();
    }

    #[test]
    fn test_disable_unblocks_parked_worker() {
        let (controller, runtime, _) =
            controller_with(MockCaptureOpener::new(), MockBackend::new());

        controller.enable();
        controller.disable();

        let shared = runtime.lock();
        assert!(shared.worker.is_none());
        assert!(!shared.enabled);
        drop(shared);
        assert_eq!(
            runtime.status_snapshot().status.get("operation").unwrap(),
            "OFF"
        );
        // The process keeps running; only the pipeline stopped.
        assert!(runtime.is_running());
    }

    #[test]
    fn test_disable_when_disabled_still_publishes_off() {
        let (controller, runtime, _) =
            controller_with(MockCaptureOpener::new(), MockBackend::new());

        runtime.update_status(keys::OPERATION, "scrambled");
        controller.disable();

        assert_eq!(
            runtime.status_snapshot().status.get("operation").unwrap(),
            "OFF"
        );
    }

    #[test]
    fn test_full_cycle_produces_transcript() {
        let mut chunks = vec![loud(), loud()];
        chunks.extend(vec![quiet(); 20]);
        let opener = MockCaptureOpener::new().with_chunks(chunks).with_close_after();
        let backend = MockBackend::new().with_events(vec![TranscriptEvent {
            text: "full cycle".to_string(),
            is_final: true,
        }]);
        let (controller, runtime, backend) = controller_with(opener, backend);

        controller.enable();
        wait_for_worker_exit(&runtime);

        assert_eq!(runtime.text_snapshot().text, "full cycle");
        assert_eq!(backend.exchange_count(), 1);

        controller.disable();
        assert!(runtime.is_running());
    }

    #[test]
    fn test_capture_open_failure_is_fatal() {
        let opener = MockCaptureOpener::new().with_open_failure();
        let (controller, runtime, backend) = controller_with(opener, MockBackend::new());

        controller.enable();
        wait_for_worker_exit(&runtime);

        assert!(!runtime.is_running());
        assert_eq!(backend.exchange_count(), 0);
        assert_eq!(
            runtime.status_snapshot().status.get("api_state").unwrap(),
            "OFF"
        );
    }

    #[test]
    fn test_backend_failure_is_fatal() {
        let mut chunks = vec![loud()];
        chunks.extend(vec![quiet(); 20]);
        let opener = MockCaptureOpener::new().with_chunks(chunks).with_close_after();
        let backend = MockBackend::new().with_open_failure();
        let (controller, runtime, _) = controller_with(opener, backend);

        controller.enable();
        wait_for_worker_exit(&runtime);

        assert!(!runtime.is_running());
    }

    #[test]
    fn test_reenable_after_disable_constructs_fresh_pipeline() {
        let mut chunks = vec![loud()];
        chunks.extend(vec![quiet(); 20]);
        let opener = MockCaptureOpener::new().with_chunks(chunks).with_close_after();
        let backend = MockBackend::new().with_events(vec![TranscriptEvent {
            text: "pass".to_string(),
            is_final: true,
        }]);
        let (controller, runtime, backend) = controller_with(opener, backend);

        controller.enable();
        wait_for_worker_exit(&runtime);
        controller.disable();

        controller.enable();
        wait_for_worker_exit(&runtime);
        controller.disable();

        // Each enable opened a fresh capture and ran its own exchange.
        assert_eq!(backend.exchange_count(), 2);
        assert!(runtime.is_running());
    }
}
