// src/core/clock.rs
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

use crate::core::lock::lock_mutex;

/// Source of wall-clock time for admission decisions and artifact names.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to. Used to drive the scheduler tick by tick.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Local wall time `y-m-d h:mi:s`. Panics on a non-existent local time.
    pub fn at_local(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> Self {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .expect("valid calendar time");
        let start = Local
            .from_local_datetime(&naive)
            .earliest()
            .expect("local time exists");
        Self::new(start)
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = lock_mutex(&self.now, "manual_clock.advance");
        *now += Duration::seconds(secs);
    }

    pub fn set(&self, at: DateTime<Local>) {
        *lock_mutex(&self.now, "manual_clock.set") = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *lock_mutex(&self.now, "manual_clock.now")
    }
}

/// "Never captured" marker for fresh cycle state.
pub fn epoch() -> DateTime<Local> {
    DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local)
}

pub fn utc_ns_now() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_secs() * 1_000_000_000 + d.subsec_nanos() as u64
}
