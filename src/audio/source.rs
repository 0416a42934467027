use crate::error::{LivesubError, Result};
use crate::pipeline::{AudioChunk, IngestSender};

/// Trait for a capture session bound to the ingest queue.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// While started, the device's callback pushes PCM chunks into the sink it
/// was opened with; the callback runs on the device's own thread.
pub trait CaptureSource {
    /// Start delivering chunks to the sink.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering chunks. Idempotent.
    fn stop(&mut self) -> Result<()>;
}

/// A capture source bound to a device, plus the device's display name.
pub struct OpenedCapture {
    pub source: Box<dyn CaptureSource>,
    pub device_name: String,
}

/// Factory that binds a capture device to an ingest queue.
///
/// Opening happens on the pipeline thread, so implementations may hold
/// handles that must not cross threads (cpal streams are not `Send`).
pub trait CaptureOpener: Send + Sync {
    /// Opens the device identified by `device_hash` (empty selects the
    /// system default) and wires its callback to `sink`.
    fn open(&self, device_hash: &str, sink: IngestSender) -> Result<OpenedCapture>;
}

/// Mock capture for testing: pushes a configured chunk sequence on start.
pub struct MockCapture {
    chunks: Vec<AudioChunk>,
    sink: IngestSender,
    close_after: bool,
    started: bool,
}

impl CaptureSource for MockCapture {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        for chunk in self.chunks.drain(..) {
            self.sink.push(chunk);
        }
        if self.close_after {
            self.sink.close();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }
}

/// Mock opener producing `MockCapture` sources.
pub struct MockCaptureOpener {
    chunks: Vec<AudioChunk>,
    close_after: bool,
    should_fail_open: bool,
}

impl MockCaptureOpener {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            close_after: false,
            should_fail_open: false,
        }
    }

    /// Chunks pushed into the queue when the capture starts.
    pub fn with_chunks(mut self, chunks: Vec<AudioChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Push the terminal marker after the configured chunks.
    pub fn with_close_after(mut self) -> Self {
        self.close_after = true;
        self
    }

    /// Configure the opener to fail (device missing).
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }
}

impl Default for MockCaptureOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureOpener for MockCaptureOpener {
    fn open(&self, device_hash: &str, sink: IngestSender) -> Result<OpenedCapture> {
        if self.should_fail_open {
            return Err(LivesubError::AudioDeviceNotFound {
                device: device_hash.to_string(),
            });
        }
        Ok(OpenedCapture {
            source: Box::new(MockCapture {
                chunks: self.chunks.clone(),
                sink,
                close_after: self.close_after,
                started: false,
            }),
            device_name: "mock input".to_string(),
        })
    }
}
