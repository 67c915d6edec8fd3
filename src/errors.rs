//! Domain error types for voxlive.
//!
//! Typed errors at module boundaries replace string-encoded errors and
//! enable structured handling via pattern matching. Every fatal error also
//! carries a short user-presentable message; raw causes are logged, not
//! shown.

use thiserror::Error;

/// Errors from microphone or speaker ownership.
///
/// Fatal to the session: surfaced to the user, no retry.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("no usable audio device: {0}")]
    NotFound(String),

    #[error("audio backend failure: {0}")]
    Backend(String),

    #[error("device already closed")]
    Closed,
}

impl DeviceError {
    /// Short message suitable for the UI.
    pub fn user_message(&self) -> String {
        match self {
            DeviceError::PermissionDenied(_) => {
                "Microphone access denied. Please enable it in your settings and try again."
                    .to_string()
            }
            DeviceError::NotFound(_) => {
                "No microphone was found. Please connect one and try again.".to_string()
            }
            DeviceError::Backend(_) | DeviceError::Closed => {
                "An audio device error occurred. Please try again.".to_string()
            }
        }
    }
}

/// Initial handshake failure for the duplex stream.
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    #[error("offline: no network route to the model service")]
    Offline,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("network failure during connect: {0}")]
    Network(String),

    #[error("handshake rejected: {0}")]
    Handshake(String),
}

impl ConnectError {
    /// Map a raw transport error string onto a specific cause when one is
    /// derivable, mirroring the message buckets the assistant shows.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("requested entity was not found") || lower.contains("api key") {
            ConnectError::InvalidCredentials(message.to_string())
        } else if lower.contains("permission denied") {
            ConnectError::Handshake(message.to_string())
        } else if lower.contains("network") || lower.contains("dns") || lower.contains("timed out")
        {
            ConnectError::Network(message.to_string())
        } else {
            ConnectError::Handshake(message.to_string())
        }
    }

    /// Short message suitable for the UI.
    pub fn user_message(&self) -> String {
        match self {
            ConnectError::Offline => {
                "You appear to be offline. Please check your internet connection.".to_string()
            }
            ConnectError::InvalidCredentials(_) => {
                "Your API key is invalid or has been revoked. Please configure a valid API key."
                    .to_string()
            }
            ConnectError::InvalidConfig(_) => {
                "The session configuration was rejected. Please review your settings.".to_string()
            }
            ConnectError::Network(_) => {
                "A network error occurred. Please check your connection and try again.".to_string()
            }
            ConnectError::Handshake(msg) => {
                if msg.to_lowercase().contains("permission denied") {
                    "API permission denied. This might be an issue with your API key or project settings."
                        .to_string()
                } else {
                    "A connection error occurred. Please try again.".to_string()
                }
            }
        }
    }
}

/// Mid-session transport fault. Terminal: the stream is unusable afterward
/// and must be closed by the orchestrator.
#[derive(Debug, Clone, Error)]
#[error("stream error: {message}")]
pub struct StreamError {
    pub message: String,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Short message suitable for the UI, reusing the connect-error buckets.
    pub fn user_message(&self) -> String {
        ConnectError::classify(&self.message).user_message()
    }
}

/// Tool execution failure. Contained inside the dispatcher; never fatal.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool '{name}' failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{name}': {message}")]
    InvalidArgs { name: String, message: String },
}
