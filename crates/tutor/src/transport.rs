//! How a conversation reaches the tutor backend.
pub mod client;
pub mod endpoint;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::StreamResult;
use crate::models::message::ChatMessage;
use crate::models::role::Role;
use crate::stream::ByteStream;

pub use client::ChatClient;
pub use endpoint::{ChatEndpoint, ChatMode};

/// A message as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// Request body for the chat endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub transcript: String,
}

impl ChatRequest {
    /// Build a request from history, dropping local-only system and error entries.
    pub fn from_history<S: Into<String>>(history: &[ChatMessage], transcript: S) -> Self {
        let messages = history
            .iter()
            .filter(|message| message.role.is_conversational())
            .map(|message| WireMessage {
                role: message.role,
                content: message.content.clone(),
            })
            .collect();
        Self {
            messages,
            transcript: transcript.into(),
        }
    }
}

/// Opens a streamed response for a chat request.
///
/// Errors before the body starts (connection refused, non-success status)
/// are returned here; errors after that arrive through the stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, mode: ChatMode, request: &ChatRequest) -> StreamResult<ByteStream>;
}
