use std::time::{Duration, Instant};

/// Drops events that arrive within `window` of the last accepted one.
///
/// Rejected events do not move the window; only accepted events do.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Returns `true` and records `at` if the event qualifies.
    pub fn accept(&mut self, at: Instant) -> bool {
        if let Some(last) = self.last_accepted
            && at.saturating_duration_since(last) < self.window
        {
            return false;
        }
        self.last_accepted = Some(at);
        true
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}
