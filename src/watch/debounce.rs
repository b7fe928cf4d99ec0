//! Debouncing of raw notifications for a single target.
//!
//! Every notification pushes the deadline out by the full window, so a burst
//! of writes settles into one check after the last write goes quiet.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    hits: u32,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            hits: 0,
        }
    }

    /// Record a notification at `now`, (re)starting the quiet period.
    pub fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
        self.hits += 1;
    }

    /// When the pending check becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// If the quiet period has elapsed, clear it and return how many
    /// notifications were folded into it.
    pub fn take_ready(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(std::mem::take(&mut self.hits))
            }
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.hits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_only_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(50));

        debouncer.record(start);
        assert!(debouncer.take_ready(start + Duration::from_millis(49)).is_none());
        assert_eq!(debouncer.take_ready(start + Duration::from_millis(50)), Some(1));
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn new_notification_resets_the_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(50));

        debouncer.record(start);
        debouncer.record(start + Duration::from_millis(30));

        // 60ms after the first, only 30ms after the second.
        assert!(debouncer.take_ready(start + Duration::from_millis(60)).is_none());
        assert_eq!(debouncer.take_ready(start + Duration::from_millis(80)), Some(2));
    }
}
