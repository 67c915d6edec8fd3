//! Frame encoding between f32 PCM and the wire payload format.
//!
//! Outbound: capture frames are clamped, quantized to 16-bit little-endian
//! PCM, and base64-encoded. Inbound: model audio arrives the same way and
//! is decoded back to f32 samples, with the sample rate carried in the
//! payload's mime type (`audio/pcm;rate=24000`).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::live::protocol::InlineData;

/// A decoded chunk of model audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Encode one capture frame into the wire payload.
///
/// Samples are clamped to [-1, 1] before quantization so loud input cannot
/// wrap around into artifacts.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> InlineData {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let q = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&q.to_le_bytes());
    }
    InlineData {
        mime_type: format!("audio/pcm;rate={sample_rate}"),
        data: BASE64.encode(&bytes),
    }
}

/// Decode an inbound audio payload into an [`AudioChunk`].
///
/// Falls back to `default_rate` when the mime type carries no rate tag.
/// Returns `None` when the base64 data is malformed.
pub fn decode_chunk(payload: &InlineData, default_rate: u32) -> Option<AudioChunk> {
    let bytes = BASE64.decode(&payload.data).ok()?;
    let samples = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect();
    Some(AudioChunk {
        samples,
        sample_rate: parse_rate(&payload.mime_type).unwrap_or(default_rate),
        channels: 1,
    })
}

/// Parse the rate tag out of a `audio/pcm;rate=NNNN` mime type.
fn parse_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .find_map(|part| part.trim().strip_prefix("rate="))
        .and_then(|r| r.parse().ok())
}
