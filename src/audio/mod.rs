//! Audio: microphone capture, wire encoding, and playback scheduling.

pub mod capture;
#[cfg(feature = "devices")]
pub mod cpal_backend;
pub mod encode;
pub mod playback;

pub use capture::{AudioCapture, CaptureFrame, MicSource};
pub use encode::{decode_chunk, encode_frame, AudioChunk};
pub use playback::{NullSink, PlaybackScheduler, ScheduledSource, SpeakerSink};
