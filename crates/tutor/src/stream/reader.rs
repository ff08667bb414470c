use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use crate::errors::StreamResult;

/// Raw response body as delivered by a transport
pub type ByteStream = BoxStream<'static, StreamResult<Bytes>>;

/// Decoded text pieces, in arrival order
pub type TextStream = BoxStream<'static, StreamResult<String>>;

/// Incremental UTF-8 decoding that tolerates sequences split across chunks.
///
/// Invalid bytes are replaced with U+FFFD rather than failing the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid);
                        }
                        None => {
                            // incomplete sequence at the end, wait for the rest
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// Flush a dangling partial sequence once no more bytes will arrive.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Turn a byte stream into a lazy stream of text chunks.
///
/// The stream ends when the transport closes and cannot be restarted. A
/// transport error is yielded once and ends the stream.
pub fn text_chunks(mut bytes: ByteStream) -> TextStream {
    async_stream::stream! {
        let mut decoder = Utf8Decoder::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    let text = decoder.decode(&chunk);
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            yield Ok(rest);
        }
    }
    .boxed()
}
