use std::time::Duration;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub chunk_delay: Duration,
}

impl AppState {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}
