// src/notify/render.rs
use chrono::{DateTime, Utc};

use super::StatusMessage;
use crate::clock::TimeBasis;
use crate::freshness::Classification;
use crate::history::Sample;

pub const COLOR_MISSING: u32 = 0xFF0000;
pub const COLOR_STALE: u32 = 0x3498DB;
pub const COLOR_FRESH: u32 = 0x7ED321;

pub const UNKNOWN_LABEL: &str = "Queue: Unknown";

const FOOTER_MISSING: &str = "No data was received from the API. It may be down.";
const FOOTER_STALE: &str = "The queue API does not have any recent data.";

#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Realm name shown in titles, e.g. "Faerlina".
    pub server_name: String,
    pub time_basis: TimeBasis,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            server_name: "Faerlina".to_string(),
            time_basis: TimeBasis::default(),
        }
    }
}

pub fn render_status(
    c: Classification,
    latest: Option<&Sample>,
    now: DateTime<Utc>,
    ctx: &RenderContext,
) -> StatusMessage {
    let updated = |s: &Sample| {
        format!(
            "Updated @ {} ({})",
            format_absolute(s.timestamp, ctx.time_basis),
            format_relative(s.timestamp, now)
        )
    };

    match (c, latest) {
        (Classification::Fresh, Some(s)) => {
            let title = if s.position == 0 {
                format!("{} Queue: None!", ctx.server_name)
            } else {
                format!("{} Queue: {}", ctx.server_name, s.position)
            };
            let description = match s.estimated_minutes {
                Some(m) if s.position > 0 => format!("Est. {m} mins - {}", updated(s)),
                _ => updated(s),
            };
            StatusMessage {
                title,
                description,
                color: COLOR_FRESH,
                footer: None,
            }
        }
        (Classification::Stale, Some(s)) => StatusMessage {
            title: format!("{} Queue: Unknown", ctx.server_name),
            description: updated(s),
            color: COLOR_STALE,
            footer: Some(FOOTER_STALE.to_string()),
        },
        _ => StatusMessage {
            title: format!("{} Queue: Unknown", ctx.server_name),
            description: String::new(),
            color: COLOR_MISSING,
            footer: Some(FOOTER_MISSING.to_string()),
        },
    }
}

pub fn room_label(c: Classification, latest: Option<&Sample>) -> String {
    match (c, latest) {
        (Classification::Fresh, Some(s)) => format!("Queue: {}", s.position),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

/// e.g. `09/06/2025, 6:05 PM`
pub fn format_absolute(ts: DateTime<Utc>, basis: TimeBasis) -> String {
    basis.format(ts, "%m/%d/%Y, %-I:%M %p")
}

/// Human distance between `ts` and `now` with an "ago"/"in" suffix.
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(ts).num_seconds();
    let future = secs < 0;
    let minutes = (secs.unsigned_abs() as f64 / 60.0).round() as u64;

    let phrase = match minutes {
        0 => "less than a minute".to_string(),
        1 => "1 minute".to_string(),
        2..=44 => format!("{minutes} minutes"),
        45..=89 => "about 1 hour".to_string(),
        90..=1439 => format!("about {} hours", (minutes as f64 / 60.0).round() as u64),
        1440..=2519 => "1 day".to_string(),
        2520..=43199 => format!("{} days", (minutes as f64 / 1440.0).round() as u64),
        43200..=86399 => {
            let months = (minutes as f64 / 43200.0).round() as u64;
            if months == 1 {
                "about 1 month".to_string()
            } else {
                format!("about {months} months")
            }
        }
        _ => {
            let months = minutes / 43200;
            if months < 12 {
                format!("{months} months")
            } else {
                let years = months / 12;
                let rem = months % 12;
                let years_word = |n: u64| if n == 1 { "year" } else { "years" };
                if rem < 3 {
                    format!("about {years} {}", years_word(years))
                } else if rem < 9 {
                    format!("over {years} {}", years_word(years))
                } else {
                    format!("almost {} years", years + 1)
                }
            }
        }
    };

    if future {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}
