//! Bookkeeping for the polling loops: consecutive timeouts and stalled progress.
use std::time::Duration;
use std::time::Instant;

/// Counts consecutive polling timeouts.
#[derive(Debug, Clone)]
pub struct TimeoutCounter {
    count: u32,
    max: u32,
}

impl TimeoutCounter {
    /// Give up once more than `max` timeouts happened in a row.
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }
    /// Record a timeout. Returns `true` if the limit is exceeded.
    pub fn timeout(&mut self) -> bool {
        self.count += 1;
        self.exceeded()
    }
    /// Record a successful poll.
    pub fn reset(&mut self) {
        self.count = 0;
    }
    pub fn count(&self) -> u32 {
        self.count
    }
    pub fn exceeded(&self) -> bool {
        self.count > self.max
    }
}

/// Detects a progress counter that stopped changing.
#[derive(Debug, Clone)]
pub struct StagnationTimer {
    last_value: Option<u64>,
    last_change: Instant,
    limit: Duration,
}

impl StagnationTimer {
    pub fn new(limit: Duration) -> Self {
        Self::starting_at(limit, Instant::now())
    }
    pub fn starting_at(limit: Duration, now: Instant) -> Self {
        Self {
            last_value: None,
            last_change: now,
            limit,
        }
    }
    /// Feed the current counter value.
    pub fn observe(&mut self, value: u64, now: Instant) {
        if self.last_value != Some(value) {
            self.last_value = Some(value);
            self.last_change = now;
        }
    }
    /// Time since the counter last changed.
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_change)
    }
    pub fn is_stalled(&self, now: Instant) -> bool {
        self.idle(now) >= self.limit
    }
    /// Start over, e.g., after restarting the stream.
    pub fn restart(&mut self, now: Instant) {
        self.last_value = None;
        self.last_change = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_exceed_after_max() {
        let mut t = TimeoutCounter::new(2);
        assert!(!t.timeout());
        assert!(!t.timeout());
        assert!(t.timeout());
        assert_eq!(t.count(), 3);
    }

    #[test]
    fn timeouts_reset() {
        let mut t = TimeoutCounter::new(1);
        assert!(!t.timeout());
        t.reset();
        assert!(!t.timeout());
        assert!(!t.exceeded());
    }

    #[test]
    fn zero_tolerance() {
        let mut t = TimeoutCounter::new(0);
        assert!(t.timeout());
    }

    #[test]
    fn stagnation() {
        let t0 = Instant::now();
        let limit = Duration::from_millis(100);
        let mut s = StagnationTimer::starting_at(limit, t0);

        s.observe(0, t0);
        assert!(!s.is_stalled(t0 + Duration::from_millis(50)));
        s.observe(10, t0 + Duration::from_millis(60));
        assert!(!s.is_stalled(t0 + Duration::from_millis(150)));
        s.observe(10, t0 + Duration::from_millis(150));
        assert!(s.is_stalled(t0 + Duration::from_millis(160)));
        assert_eq!(s.idle(t0 + Duration::from_millis(160)), limit);
    }

    #[test]
    fn stagnation_restart() {
        let t0 = Instant::now();
        let mut s = StagnationTimer::starting_at(Duration::from_millis(10), t0);
        s.observe(5, t0);
        let later = t0 + Duration::from_millis(20);
        assert!(s.is_stalled(later));
        s.restart(later);
        assert!(!s.is_stalled(later));
        // same value as before the restart still counts as progress
        s.observe(5, later + Duration::from_millis(5));
        assert!(!s.is_stalled(later + Duration::from_millis(12)));
    }
}
