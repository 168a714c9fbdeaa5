use std::time::{Duration, Instant};

/// Wall-clock cadence for detection checks.
///
/// The next check is due one interval after the previous one ran, so a late
/// tick delays the following check instead of bunching checks together.
#[derive(Debug, Clone)]
pub struct CheckClock {
    interval: Duration,
    next_due: Option<Instant>,
}

impl CheckClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// The first check is due immediately.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.map_or(true, |due| now >= due)
    }

    pub fn mark(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next check, zero when it is already due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_due
            .map_or(Duration::ZERO, |due| due.saturating_duration_since(now))
    }
}
