use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::endpoint::ChatMode;
use super::{ChatRequest, Transport};
use crate::errors::{StreamError, StreamResult};
use crate::stream::ByteStream;

/// One scripted answer to `open`
pub enum Script {
    /// A complete body, delivered piece by piece
    Body(Vec<StreamResult<Bytes>>),
    /// Fail before any body is returned
    Reject(StreamError),
    /// A body fed by the test through the returned sender
    Live(mpsc::UnboundedReceiver<StreamResult<Bytes>>),
}

impl Script {
    pub fn body(pieces: &[&str]) -> Self {
        Script::Body(
            pieces
                .iter()
                .map(|piece| Ok(Bytes::from(piece.to_string())))
                .collect(),
        )
    }

    pub fn live() -> (Self, mpsc::UnboundedSender<StreamResult<Bytes>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Script::Live(rx), tx)
    }
}

/// A transport that replays scripted bodies and records every request
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<(ChatMode, ChatRequest)>>>,
}

impl MockTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            requests: Arc::default(),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<(ChatMode, ChatRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, mode: ChatMode, request: &ChatRequest) -> StreamResult<ByteStream> {
        self.requests.lock().unwrap().push((mode, request.clone()));
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Body(pieces)) => Ok(stream::iter(pieces).boxed()),
            Some(Script::Reject(err)) => Err(err),
            Some(Script::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Err(StreamError::Transport("no scripted response".to_string())),
        }
    }
}
