#![cfg(feature = "devices")]

//! Real microphone and speaker backends built on cpal.
//!
//! `cpal::Stream` is not `Send`, while the device traits require their
//! implementors to be. Each backend therefore builds and owns its stream on
//! a dedicated thread; the handle kept by the rest of the crate holds only
//! a shutdown channel (and, for the speaker, the shared sample queue), all
//! of which are `Send`. Dropping the shutdown sender unparks the thread,
//! which drops the stream and releases the device.
//!
//! The mic thread pushes hardware callback buffers straight into the
//! capture channel (dropping frames the consumer has not drained). The
//! speaker keeps a sample queue drained by the output callback; ordering is
//! guaranteed by [`PlaybackScheduler`](super::playback), which only ever
//! submits chunks back-to-back.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::capture::{CaptureFrame, MicSource};
use crate::audio::encode::AudioChunk;
use crate::audio::playback::SpeakerSink;
use crate::errors::DeviceError;

/// Microphone backend over the default cpal input device.
pub struct CpalMic {
    sample_rate: u32,
    shutdown: Option<std_mpsc::Sender<()>>,
}

impl CpalMic {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shutdown: None,
        }
    }
}

impl MicSource for CpalMic {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, frames: mpsc::Sender<CaptureFrame>) -> Result<(), DeviceError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let sample_rate = self.sample_rate;

        std::thread::spawn(move || {
            let stream = match build_input_stream(sample_rate, frames) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Park here until the handle is closed; Err means the sender
            // was dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.shutdown = Some(shutdown_tx);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Backend("capture thread exited".to_string())),
        }
    }

    fn close(&mut self) {
        self.shutdown = None;
    }
}

fn build_input_stream(
    sample_rate: u32,
    frames: mpsc::Sender<CaptureFrame>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::NotFound("no default input device".to_string()))?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _| {
                // Drop rather than queue when the consumer lags.
                if frames.try_send(data.to_vec()).is_err() {
                    debug!("capture frame dropped (consumer busy)");
                }
            },
            |e| warn!("input stream error: {e}"),
            None,
        )
        .map_err(|e| map_build_error(&e.to_string()))?;

    stream
        .play()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;
    Ok(stream)
}

fn map_build_error(msg: &str) -> DeviceError {
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        DeviceError::PermissionDenied(msg.to_string())
    } else if lower.contains("no device") || lower.contains("not found") {
        DeviceError::NotFound(msg.to_string())
    } else {
        DeviceError::Backend(msg.to_string())
    }
}

struct SpeakerShared {
    queue: VecDeque<f32>,
}

/// Speaker backend over the default cpal output device.
pub struct CpalSpeaker {
    shared: Arc<Mutex<SpeakerShared>>,
    origin: tokio::time::Instant,
    sample_rate: u32,
    shutdown: Option<std_mpsc::Sender<()>>,
}

impl CpalSpeaker {
    /// Open the default output device at the given rate.
    pub fn open(sample_rate: u32) -> Result<Self, DeviceError> {
        let shared = Arc::new(Mutex::new(SpeakerShared {
            queue: VecDeque::new(),
        }));
        let cb_shared = shared.clone();

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        std::thread::spawn(move || {
            let stream = match build_output_stream(sample_rate, cb_shared) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = shutdown_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shared,
                origin: tokio::time::Instant::now(),
                sample_rate,
                shutdown: Some(shutdown_tx),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Backend("playback thread exited".to_string())),
        }
    }
}

fn build_output_stream(
    sample_rate: u32,
    shared: Arc<Mutex<SpeakerShared>>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| DeviceError::NotFound("no default output device".to_string()))?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _| {
                let mut g = shared.lock().unwrap_or_else(|e| e.into_inner());
                for slot in out.iter_mut() {
                    *slot = g.queue.pop_front().unwrap_or(0.0);
                }
            },
            |e| warn!("output stream error: {e}"),
            None,
        )
        .map_err(|e| map_build_error(&e.to_string()))?;

    stream
        .play()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;
    Ok(stream)
}

impl SpeakerSink for CpalSpeaker {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn play_at(&mut self, chunk: &AudioChunk, _start: f64) -> Result<(), DeviceError> {
        if self.shutdown.is_none() {
            return Err(DeviceError::Closed);
        }
        if chunk.sample_rate != self.sample_rate {
            warn!(
                "chunk rate {} differs from device rate {}",
                chunk.sample_rate, self.sample_rate
            );
        }
        let mut g = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        g.queue.extend(chunk.samples.iter().copied());
        Ok(())
    }

    fn stop_all(&mut self) {
        let mut g = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        g.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    // The device traits demand Send; the stream itself is not, so the
    // handles must never carry it.
    #[test]
    fn backends_are_send() {
        assert_send::<CpalMic>();
        assert_send::<CpalSpeaker>();
        assert_send::<Box<dyn MicSource>>();
        assert_send::<Box<dyn SpeakerSink>>();
    }

    #[test]
    fn build_errors_map_to_device_causes() {
        assert!(matches!(
            map_build_error("Access denied by the OS"),
            DeviceError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_build_error("device not found"),
            DeviceError::NotFound(_)
        ));
        assert!(matches!(
            map_build_error("backend exploded"),
            DeviceError::Backend(_)
        ));
    }
}
