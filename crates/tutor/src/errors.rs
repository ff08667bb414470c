use thiserror::Error;

/// Everything that can end or refuse a streamed exchange.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    ServerSignaled(String),

    #[error("Malformed frame: {0}")]
    FrameParse(String),

    #[error("Stream cancelled")]
    Cancelled,

    #[error("A response is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Please process audio content first to generate a transcription")]
    MissingTranscript,

    #[error("The tutor response contained no usable content")]
    NoContent,

    #[error("Conversation has shut down")]
    Closed,
}

impl StreamError {
    /// Cancellation ends a stream without being a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Text shown in the history entry for this failure.
    pub fn user_message(&self) -> String {
        format!("I'm sorry, I encountered an error: {}", self)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
