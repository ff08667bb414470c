use serde_json::{json, Value};

use crate::errors::{StreamError, StreamResult};

/// A single decoded event from the response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Partial content to append
    Chunk(String),
    /// End of stream marker
    Done,
    /// Failure reported by the server
    Error(String),
}

impl Frame {
    /// Parse the JSON payload of one `data:` record.
    ///
    /// Returns `Ok(None)` for well-formed payloads that carry nothing to act on,
    /// such as an empty chunk or `{"done": false}`. When several keys are
    /// present, `error` wins over `done`, which wins over `chunk`.
    pub fn parse(payload: &str) -> StreamResult<Option<Frame>> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| StreamError::FrameParse(e.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| StreamError::FrameParse(format!("expected an object, got {}", value)))?;

        match object.get("error") {
            None | Some(Value::Null) => {}
            Some(Value::String(message)) if message.is_empty() => {}
            Some(Value::String(message)) => return Ok(Some(Frame::Error(message.clone()))),
            Some(other) => return Ok(Some(Frame::Error(other.to_string()))),
        }

        if object.get("done").and_then(Value::as_bool) == Some(true) {
            return Ok(Some(Frame::Done));
        }

        match object.get("chunk") {
            Some(Value::String(chunk)) if !chunk.is_empty() => Ok(Some(Frame::Chunk(chunk.clone()))),
            Some(Value::String(_)) | Some(Value::Null) | None => Ok(None),
            Some(other) => Err(StreamError::FrameParse(format!(
                "chunk must be a string, got {}",
                other
            ))),
        }
    }

    /// Encode as a complete SSE record, trailing blank line included.
    pub fn encode(&self) -> String {
        let payload = match self {
            Frame::Chunk(text) => json!({ "chunk": text }),
            Frame::Done => json!({ "done": true }),
            Frame::Error(message) => json!({ "error": message }),
        };
        format!("data: {}\n\n", payload)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error(_))
    }
}
