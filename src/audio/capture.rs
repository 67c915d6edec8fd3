//! Microphone ownership and frame delivery.
//!
//! [`AudioCapture`] owns the microphone through a [`MicSource`] trait
//! object and exposes the captured frames as an ordered channel. The
//! channel is bounded at a single frame: backends drop frames the consumer
//! has not drained rather than queueing them, so backpressure is the
//! caller's problem, never the device's.

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::DeviceError;

/// Samples per hardware delivery, owned by the backend.
pub type CaptureFrame = Vec<f32>;

/// A microphone backend: delivers fixed-cadence f32 PCM frames into the
/// provided sender until closed.
pub trait MicSource: Send {
    /// Capture rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Begin delivering frames. Fails when the device is missing or
    /// permission is denied.
    fn open(&mut self, frames: mpsc::Sender<CaptureFrame>) -> Result<(), DeviceError>;

    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);
}

/// Owns the microphone device for the duration of a session.
pub struct AudioCapture {
    source: Box<dyn MicSource>,
    open: bool,
}

impl AudioCapture {
    pub fn new(source: Box<dyn MicSource>) -> Self {
        Self {
            source,
            open: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    /// Acquire the device and return the frame stream.
    pub fn open(&mut self) -> Result<mpsc::Receiver<CaptureFrame>, DeviceError> {
        if self.open {
            return Err(DeviceError::Backend("capture already open".to_string()));
        }
        // Capacity 1: at most one undelivered frame, per the handoff contract.
        let (tx, rx) = mpsc::channel(1);
        self.source.open(tx)?;
        self.open = true;
        debug!("audio capture opened at {} Hz", self.source.sample_rate());
        Ok(rx)
    }

    /// Release the device unconditionally. Idempotent.
    pub fn close(&mut self) {
        if self.open {
            debug!("audio capture closed");
        }
        self.source.close();
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.source.close();
    }
}
