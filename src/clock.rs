//! Clock abstraction so the scheduler can be driven with fixed instants in tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Timelike, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
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
        let mut g = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *g = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut g = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *g += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// How an instant is turned into a wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBasis {
    Fixed(FixedOffset),
    /// Host zone, looked up per instant so DST changes apply without a restart.
    Local,
}

impl Default for TimeBasis {
    fn default() -> Self {
        TimeBasis::Fixed(Utc.fix())
    }
}

impl TimeBasis {
    pub fn hour(&self, at: DateTime<Utc>) -> u32 {
        match self {
            TimeBasis::Fixed(off) => at.with_timezone(off).hour(),
            TimeBasis::Local => at.with_timezone(&Local).hour(),
        }
    }

    pub fn format(&self, at: DateTime<Utc>, fmt: &str) -> String {
        match self {
            TimeBasis::Fixed(off) => at.with_timezone(off).format(fmt).to_string(),
            TimeBasis::Local => at.with_timezone(&Local).format(fmt).to_string(),
        }
    }
}
