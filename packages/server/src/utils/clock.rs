use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Wall-clock source for activity stamps and TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let Ok(by) = Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock();
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// True once more than `ttl` has passed since `last`. A `last` in the future
/// never counts as idle.
pub fn idle_longer_than(last: DateTime<Utc>, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
    (now - last)
        .to_std()
        .map(|idle| idle > ttl)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(StdDuration::from_secs(90));
        assert_eq!((clock.now() - start).num_seconds(), 90);
    }

    #[test]
    fn test_idle_boundary_is_exclusive() {
        let last = Utc::now();
        let ttl = StdDuration::from_secs(60);
        assert!(!idle_longer_than(last, last + Duration::seconds(60), ttl));
        assert!(idle_longer_than(last, last + Duration::seconds(61), ttl));
        assert!(!idle_longer_than(last, last - Duration::seconds(5), ttl));
    }
}
