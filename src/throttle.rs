// src/throttle.rs
use chrono::{DateTime, Duration, Utc};

use crate::clock::TimeBasis;
use crate::freshness::Classification;
use crate::persist::CursorFile;

/// Cursor file key for the last "ok" broadcast.
pub const KEY_LAST_OK: &str = "lastPost";
/// Cursor file key for the last missing/stale broadcast.
pub const KEY_LAST_BAD: &str = "lastBadDataPost";

/// Throttle category. Each bucket has its own cooldown; they never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Bad,
    Ok,
}

impl Bucket {
    pub fn for_classification(c: Classification) -> Self {
        if c.is_bad() {
            Bucket::Bad
        } else {
            Bucket::Ok
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Bad => "bad",
            Bucket::Ok => "ok",
        }
    }
}

/// Last-notified instants per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationCursor {
    pub last_bad_data_notified_at: Option<DateTime<Utc>>,
    pub last_ok_notified_at: Option<DateTime<Utc>>,
}

impl NotificationCursor {
    pub fn get(&self, bucket: Bucket) -> Option<DateTime<Utc>> {
        match bucket {
            Bucket::Bad => self.last_bad_data_notified_at,
            Bucket::Ok => self.last_ok_notified_at,
        }
    }

    fn set(&mut self, bucket: Bucket, at: DateTime<Utc>) {
        match bucket {
            Bucket::Bad => self.last_bad_data_notified_at = Some(at),
            Bucket::Ok => self.last_ok_notified_at = Some(at),
        }
    }
}

/// Half-open range of local hours `[start, end)`; wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Repeat intervals per bucket. "ok" uses a shorter interval during busy hours.
#[derive(Debug, Clone, Copy)]
pub struct NotifyPolicy {
    pub bad_data_interval: Duration,
    pub busy_interval: Duration,
    pub quiet_interval: Duration,
    pub busy_hours: HourWindow,
    /// How the time of day for `busy_hours` is read.
    pub time_basis: TimeBasis,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            bad_data_interval: Duration::minutes(120),
            busy_interval: Duration::minutes(20),
            quiet_interval: Duration::minutes(60),
            busy_hours: HourWindow { start: 16, end: 1 },
            time_basis: TimeBasis::default(),
        }
    }
}

impl NotifyPolicy {
    pub fn is_busy_hour(&self, now: DateTime<Utc>) -> bool {
        self.busy_hours.contains(self.time_basis.hour(now))
    }

    pub fn interval_for(&self, c: Classification, now: DateTime<Utc>) -> Duration {
        match Bucket::for_classification(c) {
            Bucket::Bad => self.bad_data_interval,
            Bucket::Ok if self.is_busy_hour(now) => self.busy_interval,
            Bucket::Ok => self.quiet_interval,
        }
    }

    /// Pure decision; does NOT mutate the cursor.
    pub fn should_notify(
        &self,
        c: Classification,
        now: DateTime<Utc>,
        cursor: &NotificationCursor,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        match cursor.get(Bucket::for_classification(c)) {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.interval_for(c, now),
        }
    }
}

/// Stamp the bucket of `c` with `now`.
pub fn record_notified(c: Classification, now: DateTime<Utc>, cursor: &mut NotificationCursor) {
    cursor.set(Bucket::for_classification(c), now);
}

/// Cooldown gate that owns the cursor and writes it through to disk.
#[derive(Debug)]
pub struct Throttle {
    policy: NotifyPolicy,
    cursor: NotificationCursor,
    store: CursorFile,
}

impl Throttle {
    pub fn new(policy: NotifyPolicy, cursor: NotificationCursor, store: CursorFile) -> Self {
        Self {
            policy,
            cursor,
            store,
        }
    }

    /// Load the cursor from disk. Unreadable state starts empty.
    pub async fn hydrate(policy: NotifyPolicy, store: CursorFile) -> Self {
        let mut cursor = NotificationCursor::default();
        match store.get::<DateTime<Utc>>(KEY_LAST_BAD).await {
            Ok(v) => cursor.last_bad_data_notified_at = v,
            Err(e) => tracing::warn!(error = %e, key = KEY_LAST_BAD, "cursor read failed"),
        }
        match store.get::<DateTime<Utc>>(KEY_LAST_OK).await {
            Ok(v) => cursor.last_ok_notified_at = v,
            Err(e) => tracing::warn!(error = %e, key = KEY_LAST_OK, "cursor read failed"),
        }
        tracing::debug!(?cursor, path = %store.path().display(), "cursor hydrated");
        Self::new(policy, cursor, store)
    }

    pub fn policy(&self) -> &NotifyPolicy {
        &self.policy
    }

    pub fn cursor(&self) -> &NotificationCursor {
        &self.cursor
    }

    pub fn should_notify(&self, c: Classification, now: DateTime<Utc>, force: bool) -> bool {
        self.policy.should_notify(c, now, &self.cursor, force)
    }

    /// Record a notification about to be dispatched and persist the cursor.
    /// A failed write keeps the in-memory cursor.
    pub async fn record_notified(&mut self, c: Classification, now: DateTime<Utc>) {
        record_notified(c, now, &mut self.cursor);
        let entries = [
            (KEY_LAST_BAD, self.cursor.last_bad_data_notified_at),
            (KEY_LAST_OK, self.cursor.last_ok_notified_at),
        ];
        if let Err(e) = self.store.put_many(&entries).await {
            tracing::warn!(error = %e, path = %self.store.path().display(), "cursor write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Timelike};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, h, m, 0).unwrap()
    }

    #[test]
    fn busy_window_wraps_midnight() {
        let w = HourWindow { start: 16, end: 1 };
        assert!(w.contains(16));
        assert!(w.contains(23));
        assert!(w.contains(0));
        assert!(!w.contains(1));
        assert!(!w.contains(15));
    }

    #[test]
    fn interval_table() {
        let p = NotifyPolicy::default();
        assert_eq!(p.interval_for(Classification::Missing, at(18, 0)), Duration::minutes(120));
        assert_eq!(p.interval_for(Classification::Stale, at(3, 0)), Duration::minutes(120));
        assert_eq!(p.interval_for(Classification::Fresh, at(18, 0)), Duration::minutes(20));
        assert_eq!(p.interval_for(Classification::Fresh, at(0, 30)), Duration::minutes(20));
        assert_eq!(p.interval_for(Classification::Fresh, at(1, 0)), Duration::minutes(60));
        assert_eq!(p.interval_for(Classification::Fresh, at(15, 59)), Duration::minutes(60));
    }

    #[test]
    fn offset_shifts_the_busy_window() {
        // 14:00 UTC is 16:00 at UTC+2
        let p = NotifyPolicy {
            time_basis: TimeBasis::Fixed(FixedOffset::east_opt(2 * 3600).unwrap()),
            ..NotifyPolicy::default()
        };
        assert!(p.is_busy_hour(at(14, 0)));
        assert!(!NotifyPolicy::default().is_busy_hour(at(14, 0)));
    }

    #[test]
    fn local_basis_follows_host_zone_per_instant() {
        let p = NotifyPolicy {
            time_basis: TimeBasis::Local,
            ..NotifyPolicy::default()
        };
        // Every half hour across a winter day and a summer day.
        for day in [Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap(), at(0, 0) + Duration::days(300)] {
            for step in 0..48 {
                let t = day + Duration::minutes(30 * step);
                let hour = t.with_timezone(&chrono::Local).hour();
                assert_eq!(p.is_busy_hour(t), p.busy_hours.contains(hour), "at {t}");
            }
        }
    }

    #[test]
    fn first_notification_passes_and_record_sets_only_its_bucket() {
        let p = NotifyPolicy::default();
        let mut cur = NotificationCursor::default();
        assert!(p.should_notify(Classification::Stale, at(9, 0), &cur, false));
        record_notified(Classification::Stale, at(9, 0), &mut cur);
        assert_eq!(cur.last_bad_data_notified_at, Some(at(9, 0)));
        assert_eq!(cur.last_ok_notified_at, None);
        assert!(!p.should_notify(Classification::Missing, at(9, 10), &cur, false));
        assert!(p.should_notify(Classification::Fresh, at(9, 10), &cur, false));
    }

    #[test]
    fn force_bypasses_cooldown() {
        let p = NotifyPolicy::default();
        let mut cur = NotificationCursor::default();
        record_notified(Classification::Fresh, at(18, 0), &mut cur);
        assert!(!p.should_notify(Classification::Fresh, at(18, 1), &cur, false));
        assert!(p.should_notify(Classification::Fresh, at(18, 1), &cur, true));
    }
}
