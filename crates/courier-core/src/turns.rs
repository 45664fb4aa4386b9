//! Conversation turns.
//!
//! A session's history is an ordered list of [`Turn`]s. Roles alternate
//! user → assistant; the relay appends the user turn when a prompt is
//! submitted and the assistant turn when its stream finalizes.

use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human prompt.
    User,
    /// The model reply (possibly partial on error or cancellation).
    Assistant,
}

/// One message in a session's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of this turn.
    pub role: Role,
    /// Message text. May be empty for an assistant turn whose stream
    /// produced no chunks.
    pub text: String,
}

impl Turn {
    /// Create a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// Whether this turn was authored by the user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}
