//! Decides whether the latest sample can be trusted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::history::Sample;

pub const DEFAULT_STALE_AFTER_MINS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    /// The fetch produced no usable samples.
    Missing,
    /// The newest sample is older than the freshness threshold.
    Stale,
    Fresh,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Missing => "MISSING",
            Classification::Stale => "STALE",
            Classification::Fresh => "FRESH",
        }
    }

    pub fn is_bad(self) -> bool {
        !matches!(self, Classification::Fresh)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `latest` is `None` when the fetch failed or returned nothing.
/// A sample exactly `stale_after` old is still fresh.
pub fn classify(latest: Option<&Sample>, now: DateTime<Utc>, stale_after: Duration) -> Classification {
    match latest {
        None => Classification::Missing,
        Some(s) if now.signed_duration_since(s.timestamp) > stale_after => Classification::Stale,
        Some(_) => Classification::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 18, 0, 0).unwrap()
    }

    fn sample_aged(age: Duration) -> Sample {
        Sample::new(now() - age, 12, Some(4))
    }

    #[test]
    fn exactly_threshold_is_fresh() {
        let s = sample_aged(Duration::minutes(30));
        assert_eq!(classify(Some(&s), now(), Duration::minutes(30)), Classification::Fresh);
    }

    #[test]
    fn one_second_past_threshold_is_stale() {
        let s = sample_aged(Duration::minutes(30) + Duration::seconds(1));
        assert_eq!(classify(Some(&s), now(), Duration::minutes(30)), Classification::Stale);
    }

    #[test]
    fn absent_sample_is_missing() {
        assert_eq!(classify(None, now(), Duration::minutes(30)), Classification::Missing);
    }

    #[test]
    fn sample_from_the_future_is_fresh() {
        let s = Sample::new(now() + Duration::minutes(2), 1, None);
        assert_eq!(classify(Some(&s), now(), Duration::minutes(30)), Classification::Fresh);
    }
}
