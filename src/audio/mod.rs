//! Audio capture boundary: device enumeration, fingerprints and the
//! capture-to-queue bridge.

pub mod capture;
pub mod device;
pub mod source;

pub use capture::{CpalCaptureOpener, suppress_audio_warnings};
pub use device::{AudioInputDevice, device_fingerprint, list_input_devices};
pub use source::{CaptureOpener, CaptureSource, MockCapture, MockCaptureOpener, OpenedCapture};
