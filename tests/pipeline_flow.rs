//! End-to-end pipeline tests over the public API: mock capture in, mock
//! backend out, transcripts and status observable through the runtime.

use livesub::audio::MockCaptureOpener;
use livesub::config::{Config, GateConfig, GateConfigPatch};
use livesub::pipeline::AudioChunk;
use livesub::runtime::{LifecycleController, Runtime};
use livesub::stt::{MockBackend, SpeechBackend, TranscriptEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn loud() -> AudioChunk {
    AudioChunk::from_samples(&[-20000i16, 20000])
}

/// Silent chunk with a distinguishable payload.
fn tagged(tag: i16) -> AudioChunk {
    AudioChunk::from_samples(&[0i16, tag])
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    true
}

fn build(
    chunks: Vec<AudioChunk>,
    gate: GateConfig,
    events: Vec<TranscriptEvent>,
) -> (LifecycleController, Arc<Runtime>, Arc<MockBackend>) {
    let config = Config {
        gate,
        ..Config::default()
    };
    let runtime = Arc::new(Runtime::new(&config));
    let backend = Arc::new(MockBackend::new().with_events(events));
    let opener = MockCaptureOpener::new()
        .with_chunks(chunks)
        .with_close_after();
    let controller = LifecycleController::new(
        Arc::clone(&runtime),
        Arc::new(opener),
        Arc::clone(&backend) as Arc<dyn SpeechBackend>,
    );
    (controller, runtime, backend)
}

#[test]
fn utterance_scenario_end_to_end() {
    // 20 silent chunks, 3 loud, 10 silent, with onset=release=500,
    // pause_frames=2, off_frames=5, preactive_frames=5. The backend must
    // receive exactly: the last 5 silent chunks as pre-roll, the 3 loud
    // chunks, and the first trailing silent chunk, in order.
    let mut chunks: Vec<AudioChunk> = (0..20).map(tagged).collect();
    chunks.extend(vec![loud(); 3]);
    chunks.extend((20..30).map(tagged));

    let gate = GateConfig {
        onset_volume: 500,
        release_volume: 500,
        pause_frames: 2,
        off_frames: 5,
        preactive_frames: 5,
    };
    let (controller, runtime, backend) = build(
        chunks,
        gate,
        vec![TranscriptEvent {
            text: "scenario".to_string(),
            is_final: true,
        }],
    );

    controller.enable();
    assert!(wait_until(
        || backend.exchange_count() == 1 && runtime.text_snapshot().text == "scenario",
        Duration::from_secs(5),
    ));
    controller.disable();

    let mut expected: Vec<u8> = Vec::new();
    for chunk in (15..20).map(tagged) {
        expected.extend_from_slice(chunk.as_bytes());
    }
    for _ in 0..3 {
        expected.extend_from_slice(loud().as_bytes());
    }
    expected.extend_from_slice(tagged(20).as_bytes());

    assert_eq!(backend.received_bytes(), expected);
}

#[test]
fn silence_only_run_never_opens_exchange() {
    let chunks: Vec<AudioChunk> = (0..30).map(tagged).collect();
    let (controller, runtime, backend) = build(chunks, GateConfig::default(), Vec::new());

    controller.enable();
    // The run winds down on its own once the capture stream closes.
    assert!(wait_until(
        || {
            runtime
                .status_snapshot()
                .status
                .get("api_state")
                .is_some_and(|s| s == "OFF")
        },
        Duration::from_secs(5),
    ));
    controller.disable();

    assert_eq!(backend.exchange_count(), 0);
    assert!(backend.received_bytes().is_empty());
}

#[test]
fn transcript_observable_through_long_poll() {
    let mut chunks = vec![loud(), loud()];
    chunks.extend((0..20).map(tagged));
    let (controller, runtime, _backend) = build(
        chunks,
        GateConfig {
            onset_volume: 500,
            release_volume: 500,
            ..GateConfig::default()
        },
        vec![
            TranscriptEvent {
                text: "live".to_string(),
                is_final: false,
            },
            TranscriptEvent {
                text: "live caption".to_string(),
                is_final: true,
            },
        ],
    );

    let initial = runtime.text_snapshot();
    let waiter_runtime = Arc::clone(&runtime);
    let known = initial.text_md5.clone();
    let waiter =
        std::thread::spawn(move || waiter_runtime.wait_for_text(&known, Duration::from_secs(5)));

    controller.enable();
    let snapshot = waiter.join().expect("waiter panicked");
    // Woken by the first publication; the final state settles afterwards.
    assert!(!snapshot.text.is_empty());
    assert_ne!(snapshot.text_md5, initial.text_md5);

    assert!(wait_until(
        || runtime.text_snapshot().text == "live caption",
        Duration::from_secs(5),
    ));
    assert_eq!(
        runtime
            .status_snapshot()
            .status
            .get("subtitle")
            .map(String::as_str),
        Some("live caption")
    );
    controller.disable();
}

#[test]
fn lifecycle_is_idempotent_and_publishes_operation() {
    let (controller, runtime, _backend) =
        build(Vec::new(), GateConfig::default(), Vec::new());

    controller.enable();
    controller.enable();
    assert_eq!(
        runtime
            .status_snapshot()
            .status
            .get("operation")
            .map(String::as_str),
        Some("ON")
    );

    controller.disable();
    controller.disable();
    assert_eq!(
        runtime
            .status_snapshot()
            .status
            .get("operation")
            .map(String::as_str),
        Some("OFF")
    );
    assert!(runtime.is_running());
}

#[test]
fn config_patch_applies_between_runs() {
    let (controller, runtime, _backend) =
        build(Vec::new(), GateConfig::default(), Vec::new());

    let patch = GateConfigPatch::from_json(r#"{"onsetVolume": 1234, "preactiveFrames": 2}"#)
        .expect("valid patch");
    runtime.apply_gate_patch(&patch).expect("patch applies");

    let gate = runtime.gate_config();
    assert_eq!(gate.onset_volume, 1234);
    assert_eq!(gate.preactive_frames, 2);
    assert_eq!(gate.off_frames, GateConfig::default().off_frames);

    // An invalid follow-up leaves the applied values untouched.
    let invalid = GateConfigPatch::from_json(r#"{"offFrames": 1}"#).expect("parses");
    assert!(runtime.apply_gate_patch(&invalid).is_err());
    assert_eq!(runtime.gate_config().onset_volume, 1234);

    controller.disable();
}

#[test]
fn fatal_backend_error_clears_running_and_wakes_waiters() {
    let mut chunks = vec![loud()];
    chunks.extend((0..20).map(tagged));
    let config = Config::default();
    let runtime = Arc::new(Runtime::new(&config));
    let backend = Arc::new(MockBackend::new().with_open_failure());
    let opener = MockCaptureOpener::new()
        .with_chunks(chunks)
        .with_close_after();
    let controller = LifecycleController::new(
        Arc::clone(&runtime),
        Arc::new(opener),
        Arc::clone(&backend) as Arc<dyn SpeechBackend>,
    );

    // A parked waiter is released promptly — by the first status
    // publication or by the shutdown itself — never by its deadline.
    let snapshot = runtime.status_snapshot();
    let waiter_runtime = Arc::clone(&runtime);
    let known = snapshot.status_hash.clone();
    let waiter = std::thread::spawn(move || {
        waiter_runtime.wait_for_status(&known, Duration::from_secs(30))
    });

    controller.enable();
    assert!(wait_until(|| !runtime.is_running(), Duration::from_secs(5)));

    let start = Instant::now();
    let _ = waiter.join().expect("waiter panicked");
    assert!(start.elapsed() < Duration::from_secs(5));
}
