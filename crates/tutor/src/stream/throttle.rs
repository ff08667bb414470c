use std::time::{Duration, Instant};

/// Rate limit for publishing streaming snapshots.
///
/// Each aggregator owns its own throttle so mounting several conversations
/// never lets one delay another's updates.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns true and records `now` when a publish is allowed.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
