use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use tutor::stream::Frame;
use tutor::transport::ChatMode;

const TRANSCRIPT_REQUIRED: &str = "Transcript is required";
const MESSAGES_REQUIRED: &str = "At least one message is required";

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ReplyResponse {
    message: String,
}

/// Event stream of `data: {...}` frames
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

impl ChatRequest {
    fn validate(&self) -> Result<(), &'static str> {
        if self.transcript.trim().is_empty() {
            return Err(TRANSCRIPT_REQUIRED);
        }
        if self.messages.is_empty() {
            return Err(MESSAGES_REQUIRED);
        }
        Ok(())
    }

    fn last_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| message.content.trim())
    }
}

/// The stand-in tutor reply for a mode
fn canned_reply(mode: ChatMode, request: &ChatRequest) -> String {
    let question = request.last_question().unwrap_or("your question");
    match mode {
        ChatMode::Socratic => format!(
            "I'd be happy to discuss this lecture with you. You asked \"{}\". \
             What specific aspect would you like to explore further? \
             Is there a concept you find particularly challenging or interesting?",
            question
        ),
        ChatMode::Direct => {
            let opening = request
                .transcript
                .split(". ")
                .next()
                .unwrap_or_default()
                .trim()
                .trim_end_matches('.');
            format!(
                "Based on the transcript, the lecture opens with: {}. \
                 That is the context for \"{}\". \
                 Ask a follow-up question to go deeper.",
                opening, question
            )
        }
        ChatMode::Talk => format!(
            "Sure, let's talk it through. \"{}\" is a good place to start. \
             Tell me what you already remember from the lecture.",
            question
        ),
    }
}

/// Split a reply into the blocks that are streamed as separate chunks
fn split_blocks(text: &str) -> Vec<String> {
    let pieces: Vec<&str> = text.split(". ").collect();
    let last = pieces.len().saturating_sub(1);
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            if i < last {
                format!("{}. ", piece)
            } else {
                piece.to_string()
            }
        })
        .filter(|block| !block.is_empty())
        .collect()
}

fn stream_reply(mode: ChatMode, delay: Duration, request: ChatRequest) -> SseResponse {
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    tokio::spawn(async move {
        if let Err(message) = request.validate() {
            info!(%mode, "rejecting chat request: {}", message);
            let _ = tx.send(Frame::Error(message.to_string()).encode()).await;
            return;
        }

        let reply = canned_reply(mode, &request);
        for block in split_blocks(&reply) {
            if tx.send(Frame::Chunk(block).encode()).await.is_err() {
                debug!(%mode, "client disconnected mid-stream");
                return;
            }
            tokio::time::sleep(delay).await;
        }
        let _ = tx.send(Frame::Done.encode()).await;
    });

    SseResponse::new(stream)
}

async fn socratic_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> SseResponse {
    stream_reply(ChatMode::Socratic, state.chunk_delay, request)
}

async fn direct_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> SseResponse {
    stream_reply(ChatMode::Direct, state.chunk_delay, request)
}

async fn talk_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> SseResponse {
    stream_reply(ChatMode::Talk, state.chunk_delay, request)
}

fn reply(mode: ChatMode, request: ChatRequest) -> Result<Json<ReplyResponse>, (StatusCode, Json<Value>)> {
    request
        .validate()
        .map_err(|message| (StatusCode::BAD_REQUEST, Json(json!({ "detail": message }))))?;
    Ok(Json(ReplyResponse {
        message: canned_reply(mode, &request),
    }))
}

async fn socratic_reply(
    Json(request): Json<ChatRequest>,
) -> Result<Json<ReplyResponse>, (StatusCode, Json<Value>)> {
    reply(ChatMode::Socratic, request)
}

async fn direct_reply(
    Json(request): Json<ChatRequest>,
) -> Result<Json<ReplyResponse>, (StatusCode, Json<Value>)> {
    reply(ChatMode::Direct, request)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(ChatMode::Socratic.stream_path(), post(socratic_stream))
        .route(ChatMode::Direct.stream_path(), post(direct_stream))
        .route(ChatMode::Talk.stream_path(), post(talk_stream))
        .route("/api/chat", post(socratic_reply))
        .route("/api/chat-direct", post(direct_reply))
        .with_state(state)
}
