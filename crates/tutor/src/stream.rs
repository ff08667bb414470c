//! Consumes a `data: {...}` event stream and turns it into conversation history.
//!
//! Bytes flow through the [`reader`] (UTF-8 decoding across chunk boundaries),
//! the [`decoder`] (blank-line delimited records into [`frame::Frame`]s) and
//! finally the [`aggregator`], which owns the conversation state machine.
pub mod aggregator;
pub mod decoder;
pub mod frame;
pub mod reader;
pub mod session;
pub mod throttle;

pub use aggregator::{Aggregator, ChatEvent, ConversationState, Flow, Status};
pub use decoder::FrameDecoder;
pub use frame::Frame;
pub use reader::{text_chunks, ByteStream, TextStream};
