use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Tutoring style; each maps to its own backend route
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatMode {
    /// Answers with guiding questions
    Socratic,
    /// Answers directly from the transcript
    #[default]
    Direct,
    /// Conversational, spoken-style replies
    Talk,
}

impl ChatMode {
    pub fn stream_path(&self) -> &'static str {
        match self {
            ChatMode::Socratic => "/api/chat-stream",
            ChatMode::Direct => "/api/chat-direct-stream",
            ChatMode::Talk => "/api/chat-talk-stream",
        }
    }

    /// Non-streaming route, where the backend offers one
    pub fn reply_path(&self) -> Option<&'static str> {
        match self {
            ChatMode::Socratic => Some("/api/chat"),
            ChatMode::Direct => Some("/api/chat-direct"),
            ChatMode::Talk => None,
        }
    }
}

/// Where a conversation sends its requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEndpoint {
    pub base_url: String,
    #[serde(default)]
    pub mode: ChatMode,
}

impl ChatEndpoint {
    pub fn new<S: Into<String>>(base_url: S, mode: ChatMode) -> Self {
        Self {
            base_url: base_url.into(),
            mode,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn stream_url(&self, mode: ChatMode) -> String {
        self.url(mode.stream_path())
    }
}
