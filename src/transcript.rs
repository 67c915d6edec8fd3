//! Live transcript aggregation and committed conversation turns.
//!
//! Partial text fragments stream in for both directions and are
//! concatenated as-is (fragments are not word-aligned; the server includes
//! whatever separators it wants). At a turn boundary the two buffers are
//! trimmed and, when at least one side has content, committed as an
//! immutable [`Turn`].

use serde::{Deserialize, Serialize};

/// One committed user/model exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub model: String,
}

/// Accumulates streamed partial transcripts for the current turn.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    user: String,
    model: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's transcript.
    pub fn append_user(&mut self, fragment: &str) {
        self.user.push_str(fragment);
    }

    /// Append a fragment of the model's transcript.
    pub fn append_model(&mut self, fragment: &str) {
        self.model.push_str(fragment);
    }

    /// Current live user text.
    pub fn user_text(&self) -> &str {
        &self.user
    }

    /// Current live model text.
    pub fn model_text(&self) -> &str {
        &self.model
    }

    /// Trim both buffers and produce a [`Turn`] if either is non-empty,
    /// clearing the live state. Calling on empty buffers is a no-op.
    pub fn commit_turn(&mut self) -> Option<Turn> {
        let user = self.user.trim().to_string();
        let model = self.model.trim().to_string();
        self.user.clear();
        self.model.clear();
        if user.is_empty() && model.is_empty() {
            None
        } else {
            Some(Turn { user, model })
        }
    }

    /// Clear both buffers without committing (interruption, history clear).
    pub fn reset(&mut self) {
        self.user.clear();
        self.model.clear();
    }

    /// Clear only the model buffer (barge-in abandons the model's turn but
    /// keeps what the user already said).
    pub fn reset_model(&mut self) {
        self.model.clear();
    }
}
