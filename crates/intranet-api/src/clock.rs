use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for expiry and window arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

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
    /// Start at a fixed unix timestamp (whole seconds).
    pub fn at(unix_secs: i64) -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp(unix_secs, 0).unwrap_or_default()),
        }
    }

    /// Start at the current wall-clock second. Useful where something else
    /// (JWT `exp` validation) also looks at real time.
    pub fn starting_now() -> Self {
        Self::at(Utc::now().timestamp())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
