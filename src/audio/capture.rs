//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::device::{default_device, find_device_by_hash};
use crate::audio::source::{CaptureOpener, CaptureSource, OpenedCapture};
use crate::defaults;
use crate::error::{LivesubError, Result};
use crate::pipeline::{AudioChunk, IngestSender};
use cpal::traits::{DeviceTrait, StreamTrait};
use tracing::warn;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
/// These are harmless but confusing to users.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Accumulates callback samples and pushes fixed 100ms chunks downstream.
struct ChunkFramer {
    sink: IngestSender,
    pending: Vec<i16>,
    chunk_samples: usize,
}

impl ChunkFramer {
    fn new(sink: IngestSender, chunk_samples: usize) -> Self {
        Self {
            sink,
            pending: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
        }
    }

    fn feed(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let chunk = AudioChunk::from_samples(&self.pending);
            self.pending = rest;
            // A dead queue means the pipeline is gone; nothing to do here,
            // the stream is torn down by its owner.
            self.sink.push(chunk);
        }
    }
}

/// Capture session bound to one cpal input stream.
///
/// Holds the stream on the thread that opened it; cpal streams must not
/// cross threads, so the pipeline worker owns this for its whole run.
pub struct CpalCapture {
    device: cpal::Device,
    sink: IngestSender,
    stream: Option<cpal::Stream>,
}

impl CpalCapture {
    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: defaults::SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            // Transient device glitches are tolerated; the queue semantics
            // already cope with missing chunks.
            warn!(error = %err, "audio stream error");
        };

        let mut framer = ChunkFramer::new(self.sink.clone(), defaults::CHUNK_SAMPLES);

        // i16/16kHz/mono — PipeWire/PulseAudio convert transparently.
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                framer.feed(data);
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // f32/16kHz/mono — for devices that only expose float formats.
        let mut framer = ChunkFramer::new(self.sink.clone(), defaults::CHUNK_SAMPLES);
        let mut scratch: Vec<i16> = Vec::new();
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    );
                    framer.feed(&scratch);
                },
                err_callback,
                None,
            )
            .map_err(|e| LivesubError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl CaptureSource for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.build_stream()?;
        stream.play().map_err(|e| LivesubError::AudioCapture {
            message: format!("Failed to start input stream: {}", e),
        })?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // Dropping the stream stops the callbacks.
            drop(stream);
        }
        Ok(())
    }
}

/// Opens cpal capture sessions by device fingerprint.
pub struct CpalCaptureOpener;

impl CaptureOpener for CpalCaptureOpener {
    fn open(&self, device_hash: &str, sink: IngestSender) -> Result<OpenedCapture> {
        let (device, device_name) = if device_hash.is_empty() {
            default_device()?
        } else {
            find_device_by_hash(device_hash)?
        };

        Ok(OpenedCapture {
            source: Box::new(CpalCapture {
                device,
                sink,
                stream: None,
            }),
            device_name,
        })
    }
}
