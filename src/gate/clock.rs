use chrono::{DateTime, Utc};

/// Source of the current time for gate evaluations.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant, for tests and replay.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_returns_same_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single();
        assert!(instant.is_some());
        if let Some(instant) = instant {
            let clock = FixedClock(instant);
            assert_eq!(clock.now(), instant);
            assert_eq!(clock.now(), clock.now());
        }
    }
}
