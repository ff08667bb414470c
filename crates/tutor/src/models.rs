//! Chat models shared by the stream aggregator, the transport and history storage.
//!
//! A `ChatMessage` is the unit of the conversation history. Only `user` and
//! `assistant` messages travel to the backend; `system` and `error` entries are
//! local annotations rendered by the interface.
pub mod message;
pub mod role;
