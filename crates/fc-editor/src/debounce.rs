//! Trailing-edge debouncer driven by an external clock.
//!
//! Each `schedule` resets the deadline; the action fires once the quiet
//! period has elapsed since the last edit of a burst. Time is passed in as
//! milliseconds so the host (browser frame loop, native timer, test) owns
//! the clock.

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Restart the quiet period at `now`.
    pub fn schedule(&mut self, now: u64) {
        self.deadline = Some(now.saturating_add(self.delay_ms));
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True exactly once per burst, when `now` has reached the deadline.
    pub fn fire_due(&mut self, now: u64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_fires_once_after_last_edit() {
        let mut d = Debouncer::new(1000);
        d.schedule(0);
        d.schedule(400);
        d.schedule(900);
        assert!(!d.fire_due(1000));
        assert!(!d.fire_due(1899));
        assert!(d.fire_due(1900));
        assert!(!d.fire_due(5000));
    }

    #[test]
    fn cancel_drops_pending() {
        let mut d = Debouncer::new(10);
        d.schedule(0);
        assert!(d.is_pending());
        d.cancel();
        assert!(!d.fire_due(100));
    }
}
