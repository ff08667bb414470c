use tracing::{debug, warn};

use super::frame::Frame;

/// Splits streamed text into blank-line delimited records and parses them.
///
/// Text may arrive split at any byte, so everything after the last record
/// boundary is kept until more text (or the end of the stream) arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text, returning every frame completed by it.
    pub fn push(&mut self, text: &str) -> Vec<Frame> {
        self.buffer.push_str(text);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let record: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = self.decode_record(&record) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left once the transport has closed. A server may end
    /// the body without the trailing blank line.
    pub fn finish(&mut self) -> Vec<Frame> {
        let record = std::mem::take(&mut self.buffer);
        if record.trim().is_empty() {
            return Vec::new();
        }
        self.decode_record(&record).into_iter().collect()
    }

    /// Number of records dropped because their payload could not be parsed
    pub fn skipped_frames(&self) -> usize {
        self.skipped
    }

    /// Bytes held back waiting for a record boundary
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn decode_record(&mut self, record: &str) -> Option<Frame> {
        let data: Vec<&str> = record
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .collect();

        // comments and keep-alives carry no data lines
        if data.is_empty() {
            return None;
        }

        let payload = data.join("\n");
        match Frame::parse(&payload) {
            Ok(Some(frame)) => {
                debug!(?frame, "decoded frame");
                Some(frame)
            }
            Ok(None) => None,
            Err(err) => {
                self.skipped += 1;
                warn!(
                    skipped = self.skipped,
                    "skipping malformed frame: {} ({})",
                    err,
                    payload
                );
                None
            }
        }
    }
}
