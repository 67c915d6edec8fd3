//! voxlive: live voice conversation sessions against a realtime model.
//!
//! Continuous microphone capture is streamed over a persistent duplex
//! channel; model audio is played back gaplessly; transcripts are
//! aggregated into turns; tool calls are dispatched out-of-band; and a
//! single controller owns the session lifecycle end to end.

pub mod audio;
pub mod config;
pub mod errors;
pub mod live;
pub mod tools;
pub mod transcript;
