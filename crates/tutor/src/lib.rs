pub mod config;
pub mod conversation;
pub mod errors;
pub mod history;
pub mod models;
pub mod stream;
pub mod transport;
