use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::decoder::FrameDecoder;
use super::frame::Frame;

/// State owned by exactly one in-flight request.
///
/// The session is consumed when it produces its history entry, which is what
/// keeps finalization from ever happening twice for the same response.
#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    cancellation: CancellationToken,
    decoder: FrameDecoder,
    accumulated: String,
    started: Instant,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
            decoder: FrameDecoder::new(),
            accumulated: String::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that aborts the transport backing this session
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn append(&mut self, text: &str) {
        self.accumulated.push_str(text);
    }

    pub fn decode(&mut self, text: &str) -> Vec<Frame> {
        self.decoder.push(text)
    }

    pub fn flush(&mut self) -> Vec<Frame> {
        self.decoder.finish()
    }

    pub fn skipped_frames(&self) -> usize {
        self.decoder.skipped_frames()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Abort the transport and hand back the accumulated text.
    pub(crate) fn abort(self) -> String {
        self.cancellation.cancel();
        self.accumulated
    }

    pub(crate) fn into_text(self) -> String {
        self.accumulated
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}
