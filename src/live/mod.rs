//! The live conversation stack: wire protocol, stream client, session
//! states, and the orchestrating controller.

pub mod client;
pub mod controller;
pub mod protocol;
pub mod state;

pub use client::{LiveConfig, LiveStream, LiveTransport, StreamHandle, WsTransport};
pub use controller::SessionController;
pub use protocol::{InlineData, OutboundFrame, ServerEvent, StreamEvent};
pub use state::{SessionSnapshot, SessionState};
