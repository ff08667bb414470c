use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::endpoint::{ChatEndpoint, ChatMode};
use super::{ChatRequest, Transport};
use crate::errors::{StreamError, StreamResult};
use crate::stream::ByteStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    message: String,
}

/// HTTP transport for the tutor backend
pub struct ChatClient {
    client: Client,
    endpoint: ChatEndpoint,
}

impl ChatClient {
    pub fn new(endpoint: ChatEndpoint) -> StreamResult<Self> {
        // No overall timeout: a response may stream for as long as the server keeps it open.
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &ChatEndpoint {
        &self.endpoint
    }

    /// Ask for a complete reply in one response body, without streaming.
    pub async fn complete(&self, mode: ChatMode, request: &ChatRequest) -> StreamResult<String> {
        let path = mode.reply_path().ok_or_else(|| {
            StreamError::Transport(format!("The {} mode only supports streaming replies", mode))
        })?;
        let url = self.endpoint.url(path);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!(%url, %status, "reply request failed");
            return Err(StreamError::Transport(format!(
                "Failed to get response from tutor ({})",
                status
            )));
        }

        let reply: ReplyResponse = response.json().await?;
        Ok(reply.message)
    }
}

#[async_trait]
impl Transport for ChatClient {
    async fn open(&self, mode: ChatMode, request: &ChatRequest) -> StreamResult<ByteStream> {
        let url = self.endpoint.stream_url(mode);
        debug!(%url, messages = request.messages.len(), "opening chat stream");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(%url, %status, "chat stream rejected");
            return Err(StreamError::Transport(format!(
                "Failed to get response from tutor ({})",
                status
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::from))
            .boxed())
    }
}
