use super::role::Role;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One immutable entry of the conversation history
pub struct ChatMessage {
    pub role: Role,
    pub created: i64,
    pub content: String,
}

impl ChatMessage {
    /// Create a message with the current timestamp
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        ChatMessage {
            role,
            created: Utc::now().timestamp(),
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    pub fn error<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Error, content)
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Error
    }
}
