//! Clock abstraction.
//!
//! Hold expiry and showtime window checks never read the wall clock directly;
//! they ask an injected `Clock`. Production wires `SystemClock`, tests and
//! demos wire `ManualClock` and move time explicitly.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch, the storage representation of instants.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
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

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(Duration::minutes(11));

        assert_eq!(clock.now(), start + Duration::minutes(11));
        assert_eq!(clock.now_ms(), start.timestamp_millis() + 11 * 60_000);
    }

    #[test]
    fn manual_clock_set_overrides() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.set(later);

        assert_eq!(clock.now(), later);
    }

    #[test]
    fn system_clock_is_monotone_enough() {
        let a = SystemClock.now_ms();
        let b = SystemClock.now_ms();
        assert!(b >= a);
    }
}
