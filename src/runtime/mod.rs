//! Process-wide shared state and change notification.
//!
//! Two independently versioned values — the current transcript and the
//! status map — live under one monitor lock together with the pipeline
//! lifecycle handle. Every mutation recomputes the affected value's content
//! hash and wakes all waiters before the lock is released, which is what
//! makes the HTTP long-poll check-then-wait race-free: a waiter that checks
//! a stale hash under the lock cannot miss the update that follows.

pub mod lifecycle;

pub use lifecycle::LifecycleController;

use crate::config::{Config, GateConfig, GateConfigPatch};
use crate::error::Result;
use crate::pipeline::IngestSender;
use md5::{Digest, Md5};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Status keys published by the core.
pub mod keys {
    pub const OPERATION: &str = "operation";
    pub const VOL_STATE: &str = "vol_state";
    pub const API_STATE: &str = "api_state";
    pub const AUDIO_INPUT_DEVICE: &str = "audio_input_device";
    pub const AUDIO_INPUT_DEVICE_HASH: &str = "audio_input_device_hash";
    pub const SUBTITLE: &str = "subtitle";
}

/// MD5 digest as lowercase hex, the version format served to observers.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Transcript value with its version hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TextSnapshot {
    pub text: String,
    pub text_md5: String,
}

/// Status map with its version hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: BTreeMap<String, String>,
    pub status_hash: String,
}

pub(crate) struct Shared {
    pub running: bool,
    pub enabled: bool,
    pub text: String,
    pub text_md5: String,
    pub status: BTreeMap<String, String>,
    pub status_hash: String,
    pub gate: GateConfig,
    pub device_hash: String,
    pub worker: Option<JoinHandle<()>>,
    pub ingest: Option<IngestSender>,
}

impl Shared {
    fn rehash_text(&mut self) {
        self.text_md5 = md5_hex(self.text.as_bytes());
    }

    fn rehash_status(&mut self) {
        // BTreeMap serializes with sorted keys, so the hash is a
        // deterministic function of the map's contents.
        let encoded = serde_json::to_string(&self.status).unwrap_or_default();
        self.status_hash = md5_hex(encoded.as_bytes());
    }

    pub(crate) fn set_status(&mut self, key: &str, value: &str) {
        self.status.insert(key.to_string(), value.to_string());
        self.rehash_status();
    }
}

/// The shared runtime record. Constructed once, owned by the composition
/// root, and passed to every component that reads or mutates it.
pub struct Runtime {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl Runtime {
    pub fn new(config: &Config) -> Self {
        let mut shared = Shared {
            running: true,
            enabled: false,
            text: String::new(),
            text_md5: String::new(),
            status: BTreeMap::new(),
            status_hash: String::new(),
            gate: config.gate.clone(),
            device_hash: config.audio.device_hash.clone(),
            worker: None,
            ingest: None,
        };
        shared.rehash_text();
        shared.status.insert(keys::OPERATION.into(), "OFF".into());
        shared.status.insert(keys::API_STATE.into(), "OFF".into());
        shared.status.insert(keys::SUBTITLE.into(), String::new());
        shared.status.insert(
            keys::AUDIO_INPUT_DEVICE_HASH.into(),
            config.audio.device_hash.clone(),
        );
        shared.rehash_status();

        Self {
            shared: Mutex::new(shared),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn notify_all(&self) {
        self.changed.notify_all();
    }

    /// Replaces the transcript, mirrors it into the `subtitle` status key,
    /// republishes both version hashes and wakes every waiter.
    pub fn update_text(&self, text: &str) {
        let mut shared = self.lock();
        shared.text = text.to_string();
        shared.rehash_text();
        shared.set_status(keys::SUBTITLE, text);
        self.changed.notify_all();
    }

    /// Replaces one status entry, republishes the hash and wakes waiters.
    pub fn update_status(&self, key: &str, value: &str) {
        let mut shared = self.lock();
        shared.set_status(key, value);
        self.changed.notify_all();
    }

    pub fn text_snapshot(&self) -> TextSnapshot {
        let shared = self.lock();
        TextSnapshot {
            text: shared.text.clone(),
            text_md5: shared.text_md5.clone(),
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let shared = self.lock();
        StatusSnapshot {
            status: shared.status.clone(),
            status_hash: shared.status_hash.clone(),
        }
    }

    /// Blocks until the transcript hash differs from `known_hash`, the
    /// runtime stops, or the timeout elapses; returns the snapshot observed
    /// at that point. A caller holding a stale hash returns immediately.
    pub fn wait_for_text(&self, known_hash: &str, timeout: Duration) -> TextSnapshot {
        let deadline = Instant::now() + timeout;
        let mut shared = self.lock();
        while shared.text_md5 == known_hash && shared.running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(shared, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            shared = guard;
        }
        TextSnapshot {
            text: shared.text.clone(),
            text_md5: shared.text_md5.clone(),
        }
    }

    /// As `wait_for_text`, over the status map's hash.
    pub fn wait_for_status(&self, known_hash: &str, timeout: Duration) -> StatusSnapshot {
        let deadline = Instant::now() + timeout;
        let mut shared = self.lock();
        while shared.status_hash == known_hash && shared.running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(shared, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            shared = guard;
        }
        StatusSnapshot {
            status: shared.status.clone(),
            status_hash: shared.status_hash.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// True while the process runs and the pipeline is enabled.
    pub fn is_live(&self) -> bool {
        let shared = self.lock();
        shared.running && shared.enabled
    }

    /// Clears the global running flag and wakes every waiter. This is the
    /// sole cross-cutting cancellation signal; every blocking wait rechecks
    /// the flag after each wake.
    pub fn shutdown(&self) {
        let mut shared = self.lock();
        shared.running = false;
        self.changed.notify_all();
    }

    /// Blocks the calling thread until the running flag clears.
    pub fn wait_until_stopped(&self) {
        let mut shared = self.lock();
        while shared.running {
            let guard = self
                .changed
                .wait_timeout(shared, Duration::from_secs(1))
                .unwrap_or_else(|e| e.into_inner());
            shared = guard.0;
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        self.lock().gate.clone()
    }

    /// Applies a partial gate update, validating the merged result before
    /// committing: an invalid patch leaves the configuration untouched.
    pub fn apply_gate_patch(&self, patch: &GateConfigPatch) -> Result<()> {
        let mut shared = self.lock();
        let merged = shared.gate.merged_with(patch);
        merged.validate()?;
        shared.gate = merged;
        Ok(())
    }

    pub fn device_hash(&self) -> String {
        self.lock().device_hash.clone()
    }

    /// Records the selected capture device fingerprint and publishes it.
    /// Takes effect the next time the pipeline is enabled.
    pub fn set_device_hash(&self, hash: &str) {
        let mut shared = self.lock();
        shared.device_hash = hash.to_string();
        shared.set_status(keys::AUDIO_INPUT_DEVICE_HASH, hash);
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn runtime() -> Runtime {
        Runtime::new(&Config::default())
    }

    #[test]
    fn test_md5_hex_known_value() {
        // Empty input: the canonical MD5 of "".
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_initial_snapshot() {
        let rt = runtime();
        let text = rt.text_snapshot();
        assert_eq!(text.text, "");
        assert_eq!(text.text_md5, md5_hex(b""));

        let status = rt.status_snapshot();
        assert_eq!(status.status.get("operation").unwrap(), "OFF");
        assert_eq!(status.status.get("api_state").unwrap(), "OFF");
    }

    #[test]
    fn test_update_text_changes_hash_and_subtitle() {
        let rt = runtime();
        let before = rt.text_snapshot();

        rt.update_text("hello");

        let after = rt.text_snapshot();
        assert_eq!(after.text, "hello");
        assert_ne!(after.text_md5, before.text_md5);
        assert_eq!(after.text_md5, md5_hex(b"hello"));

        let status = rt.status_snapshot();
        assert_eq!(status.status.get("subtitle").unwrap(), "hello");
    }

    #[test]
    fn test_status_hash_deterministic_for_same_contents() {
        let rt1 = runtime();
        let rt2 = runtime();
        rt1.update_status("a", "1");
        rt1.update_status("b", "2");
        // Insertion order differs, hash must not.
        rt2.update_status("b", "2");
        rt2.update_status("a", "1");

        assert_eq!(
            rt1.status_snapshot().status_hash,
            rt2.status_snapshot().status_hash
        );
    }

    #[test]
    fn test_wait_with_stale_hash_returns_immediately() {
        let rt = runtime();
        rt.update_text("one");

        let start = Instant::now();
        let snap = rt.wait_for_text("definitely-stale", Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(snap.text, "one");
    }

    #[test]
    fn test_wait_times_out_unchanged() {
        let rt = runtime();
        let current = rt.text_snapshot();

        let start = Instant::now();
        let snap = rt.wait_for_text(&current.text_md5, Duration::from_millis(100));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(snap.text_md5, current.text_md5);
    }

    #[test]
    fn test_waiter_woken_by_update() {
        let rt = Arc::new(runtime());
        let current = rt.text_snapshot();

        let waiter_rt = Arc::clone(&rt);
        let known = current.text_md5.clone();
        let waiter = thread::spawn(move || waiter_rt.wait_for_text(&known, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        rt.update_text("woken");

        let snap = waiter.join().unwrap();
        assert_eq!(snap.text, "woken");
    }

    #[test]
    fn test_waiter_woken_by_shutdown() {
        let rt = Arc::new(runtime());
        let current = rt.status_snapshot();

        let waiter_rt = Arc::clone(&rt);
        let known = current.status_hash.clone();
        let waiter =
            thread::spawn(move || waiter_rt.wait_for_status(&known, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        rt.shutdown();

        // Woken without a status change: the runtime stopped.
        let snap = waiter.join().unwrap();
        assert_eq!(snap.status_hash, current.status_hash);
        assert!(!rt.is_running());
    }

    #[test]
    fn test_status_waiter_woken_by_status_update() {
        let rt = Arc::new(runtime());
        let current = rt.status_snapshot();

        let waiter_rt = Arc::clone(&rt);
        let known = current.status_hash.clone();
        let waiter =
            thread::spawn(move || waiter_rt.wait_for_status(&known, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        rt.update_status("vol_state", "ACTIVE");

        let snap = waiter.join().unwrap();
        assert_eq!(snap.status.get("vol_state").unwrap(), "ACTIVE");
        assert_ne!(snap.status_hash, current.status_hash);
    }

    #[test]
    fn test_gate_patch_round_trip() {
        let rt = runtime();
        let patch = GateConfigPatch::from_json(r#"{"onsetVolume": 1234}"#).unwrap();
        rt.apply_gate_patch(&patch).unwrap();

        let gate = rt.gate_config();
        assert_eq!(gate.onset_volume, 1234);
        // Other fields untouched.
        assert_eq!(gate.release_volume, GateConfig::default().release_volume);
    }

    #[test]
    fn test_invalid_gate_patch_mutates_nothing() {
        let rt = runtime();
        let before = rt.gate_config();
        let patch = GateConfigPatch::from_json(r#"{"pauseFrames": 99}"#).unwrap();

        assert!(rt.apply_gate_patch(&patch).is_err());
        assert_eq!(rt.gate_config(), before);
    }

    #[test]
    fn test_set_device_hash_published_to_status() {
        let rt = runtime();
        rt.set_device_hash("abc123");

        assert_eq!(rt.device_hash(), "abc123");
        let status = rt.status_snapshot();
        assert_eq!(
            status.status.get("audio_input_device_hash").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_is_live_requires_enabled() {
        let rt = runtime();
        assert!(rt.is_running());
        assert!(!rt.is_live());
    }
}
