//! Session lifecycle states and the observable snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::Turn;

/// Where the session is in its lifecycle.
///
/// `Listening`, `Processing`, and `Speaking` are the active conversational
/// states; `Ended` is a short terminal display state that decays back to
/// `Idle`. `Error` is terminal until the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Activating,
    Listening,
    Processing,
    Speaking,
    Ended,
    Error,
}

impl SessionState {
    /// True while the session holds live resources.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Activating
                | SessionState::Listening
                | SessionState::Processing
                | SessionState::Speaking
        )
    }
}

/// Everything an observer needs to render the session, published over a
/// watch channel on every change.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Live (uncommitted) user transcript for the current turn.
    pub user_transcript: String,
    /// Live (uncommitted) model transcript for the current turn.
    pub model_transcript: String,
    /// Committed turns, oldest first.
    pub history: Vec<Turn>,
    pub muted: bool,
    /// User-presentable message when `state` is `Error`.
    pub error: Option<String>,
    /// When the active session started; observers derive live elapsed time.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock length of the last completed session, in seconds.
    pub last_session_secs: Option<u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}
