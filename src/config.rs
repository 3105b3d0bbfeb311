// src/config.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, FixedOffset};
use serde::Deserialize;

use crate::clock::TimeBasis;
use crate::notify::RenderContext;
use crate::persist::{DEFAULT_CURSOR_PATH, DEFAULT_HISTORY_PATH};
use crate::scheduler::{BackoffPolicy, SchedulerSettings};
use crate::throttle::{HourWindow, NotifyPolicy};

const ENV_CONFIG_PATH: &str = "QUEUE_BOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/queue_bot.toml";
/// Upper bound for every minute-valued interval (one year).
const MAX_INTERVAL_MINS: i64 = 366 * 24 * 60;

/// Token wrapper that never prints its contents.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(len={})", self.0.len())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub api_url: String,
    pub discord_token: Secret,
    pub guild_id: String,
    pub output_channel_id: String,
    pub server_name: String,

    pub stale_after_mins: i64,
    pub bad_data_interval_mins: i64,
    pub busy_interval_mins: i64,
    pub quiet_interval_mins: i64,
    pub busy_start_hour: u32,
    pub busy_end_hour: u32,
    /// Unset means the host's time zone, read at each use.
    pub utc_offset_minutes: Option<i32>,
    pub ignore_stale_notifications: bool,

    pub tick_interval_secs: u64,
    pub command_poll_secs: u64,
    pub connect_backoff_base_ms: u64,
    pub connect_backoff_cap_secs: u64,
    pub feed_timeout_secs: u64,
    pub chat_timeout_secs: u64,
    pub chat_max_retries: u8,

    pub history_path: PathBuf,
    pub cursor_path: PathBuf,
    pub status_addr: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            discord_token: Secret::default(),
            guild_id: String::new(),
            output_channel_id: String::new(),
            server_name: "Faerlina".to_string(),
            stale_after_mins: 30,
            bad_data_interval_mins: 120,
            busy_interval_mins: 20,
            quiet_interval_mins: 60,
            busy_start_hour: 16,
            busy_end_hour: 1,
            utc_offset_minutes: None,
            ignore_stale_notifications: false,
            tick_interval_secs: 600,
            command_poll_secs: 5,
            connect_backoff_base_ms: 2000,
            connect_backoff_cap_secs: 60,
            feed_timeout_secs: 15,
            chat_timeout_secs: 10,
            chat_max_retries: 3,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            cursor_path: PathBuf::from(DEFAULT_CURSOR_PATH),
            status_addr: None,
        }
    }
}

// Clamped so an unvalidated config cannot overflow `Duration`.
fn minutes(v: i64) -> Duration {
    Duration::minutes(v.clamp(0, MAX_INTERVAL_MINS))
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_str(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{key}={raw:?}: {e}")),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_str(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => bail!("{key}={v:?}: expected a boolean"),
        },
    }
}

impl BotConfig {
    /// Defaults ← config file ← environment, then validated.
    pub fn load() -> Result<Self> {
        let cfg = Self::load_unvalidated()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Same layering as [`BotConfig::load`] without the required-field checks.
    pub fn load_unvalidated() -> Result<Self> {
        let mut cfg = Self::load_file_default()?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// 1) $QUEUE_BOT_CONFIG
    /// 2) config/queue_bot.toml
    /// 3) built-in defaults
    pub fn load_file_default() -> Result<Self> {
        if let Some(p) = env_str(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        Ok(Self::default())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_str("API_URL") {
            self.api_url = v;
        }
        if let Some(v) = env_str("DISCORD_TOKEN") {
            self.discord_token = Secret::new(v);
        }
        if let Some(v) = env_str("GUILD_ID") {
            self.guild_id = v;
        }
        if let Some(v) = env_str("OUTPUT_CHANNEL_ID") {
            self.output_channel_id = v;
        }
        if let Some(v) = env_str("QUEUE_SERVER_NAME") {
            self.server_name = v;
        }
        if let Some(v) = env_parse("STALE_AFTER_MINS")? {
            self.stale_after_mins = v;
        }
        if let Some(v) = env_parse("BAD_DATA_INTERVAL_MINS")? {
            self.bad_data_interval_mins = v;
        }
        if let Some(v) = env_parse("BUSY_INTERVAL_MINS")? {
            self.busy_interval_mins = v;
        }
        if let Some(v) = env_parse("QUIET_INTERVAL_MINS")? {
            self.quiet_interval_mins = v;
        }
        if let Some(v) = env_parse("BUSY_START_HOUR")? {
            self.busy_start_hour = v;
        }
        if let Some(v) = env_parse("BUSY_END_HOUR")? {
            self.busy_end_hour = v;
        }
        if let Some(v) = env_parse("UTC_OFFSET_MINUTES")? {
            self.utc_offset_minutes = Some(v);
        }
        if let Some(v) = env_bool("IGNORE_STALE_NOTIFICATIONS")? {
            self.ignore_stale_notifications = v;
        }
        if let Some(v) = env_parse("TICK_INTERVAL_SECS")? {
            self.tick_interval_secs = v;
        }
        if let Some(v) = env_parse("COMMAND_POLL_SECS")? {
            self.command_poll_secs = v;
        }
        if let Some(v) = env_parse("CONNECT_BACKOFF_BASE_MS")? {
            self.connect_backoff_base_ms = v;
        }
        if let Some(v) = env_parse("CONNECT_BACKOFF_CAP_SECS")? {
            self.connect_backoff_cap_secs = v;
        }
        if let Some(v) = env_parse("FEED_TIMEOUT_SECS")? {
            self.feed_timeout_secs = v;
        }
        if let Some(v) = env_parse("CHAT_TIMEOUT_SECS")? {
            self.chat_timeout_secs = v;
        }
        if let Some(v) = env_parse("CHAT_MAX_RETRIES")? {
            self.chat_max_retries = v;
        }
        if let Some(v) = env_str("HISTORY_PATH") {
            self.history_path = PathBuf::from(v);
        }
        if let Some(v) = env_str("CURSOR_PATH") {
            self.cursor_path = PathBuf::from(v);
        }
        if let Some(v) = env_str("STATUS_ADDR") {
            self.status_addr = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("API_URL", self.api_url.trim().is_empty()),
            ("DISCORD_TOKEN", self.discord_token.is_empty()),
            ("GUILD_ID", self.guild_id.trim().is_empty()),
            ("OUTPUT_CHANNEL_ID", self.output_channel_id.trim().is_empty()),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, empty)| *empty)
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }
        if self.busy_start_hour > 23 || self.busy_end_hour > 23 {
            bail!("busy hours must be within 0..=23");
        }
        let intervals = [
            ("stale_after_mins", self.stale_after_mins),
            ("bad_data_interval_mins", self.bad_data_interval_mins),
            ("busy_interval_mins", self.busy_interval_mins),
            ("quiet_interval_mins", self.quiet_interval_mins),
        ];
        if let Some((k, _)) = intervals.iter().find(|(_, v)| *v <= 0) {
            bail!("{k} must be positive");
        }
        if let Some((k, v)) = intervals.iter().find(|(_, v)| *v > MAX_INTERVAL_MINS) {
            bail!("{k} = {v} exceeds {MAX_INTERVAL_MINS} minutes");
        }
        if self.tick_interval_secs == 0 || self.command_poll_secs == 0 {
            bail!("tick and command poll intervals must be positive");
        }
        if self.feed_timeout_secs == 0 || self.chat_timeout_secs == 0 || self.chat_max_retries == 0 {
            bail!("request timeouts and chat_max_retries must be positive");
        }
        if let Some(m) = self.utc_offset_minutes {
            if FixedOffset::east_opt(m * 60).is_none() {
                bail!("utc_offset_minutes {m} is out of range");
            }
        }
        Ok(())
    }

    /// A configured offset is fixed; otherwise times follow the host zone.
    pub fn time_basis(&self) -> TimeBasis {
        match self.utc_offset_minutes.and_then(|m| FixedOffset::east_opt(m * 60)) {
            Some(off) => TimeBasis::Fixed(off),
            None => TimeBasis::Local,
        }
    }

    pub fn stale_after(&self) -> Duration {
        minutes(self.stale_after_mins)
    }

    pub fn notify_policy(&self) -> NotifyPolicy {
        NotifyPolicy {
            bad_data_interval: minutes(self.bad_data_interval_mins),
            busy_interval: minutes(self.busy_interval_mins),
            quiet_interval: minutes(self.quiet_interval_mins),
            busy_hours: HourWindow {
                start: self.busy_start_hour,
                end: self.busy_end_hour,
            },
            time_basis: self.time_basis(),
        }
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            server_name: self.server_name.clone(),
            time_basis: self.time_basis(),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            server_id: self.guild_id.clone(),
            room_id: self.output_channel_id.clone(),
            tick_interval: StdDuration::from_secs(self.tick_interval_secs),
            stale_after: self.stale_after(),
            ignore_stale_notifications: self.ignore_stale_notifications,
            backoff: BackoffPolicy {
                base: StdDuration::from_millis(self.connect_backoff_base_ms),
                cap: StdDuration::from_secs(self.connect_backoff_cap_secs),
            },
            render: self.render_context(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg: BotConfig = toml::from_str(
            r#"
api_url = "https://example.test/queue"
discord_token = "abc"
guild_id = "1"
output_channel_id = "2"
busy_interval_mins = 15
"#,
        )
        .unwrap();
        assert_eq!(cfg.busy_interval_mins, 15);
        assert_eq!(cfg.quiet_interval_mins, 60);
        assert_eq!(cfg.server_name, "Faerlina");
        cfg.validate().unwrap();
    }

    #[test]
    fn debug_never_prints_token() {
        let cfg = BotConfig {
            discord_token: Secret::new("super-secret-token"),
            ..BotConfig::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("super-secret-token"));
        assert!(out.contains("Secret(len=18)"));
    }

    #[test]
    fn validate_lists_missing_required_settings() {
        let err = BotConfig::default().validate().unwrap_err().to_string();
        assert!(err.contains("API_URL"));
        assert!(err.contains("OUTPUT_CHANNEL_ID"));
    }

    #[test]
    fn policy_from_config() {
        let cfg = BotConfig {
            utc_offset_minutes: Some(-300),
            ..BotConfig::default()
        };
        let p = cfg.notify_policy();
        assert_eq!(p.bad_data_interval, Duration::minutes(120));
        assert_eq!(p.busy_hours, HourWindow { start: 16, end: 1 });
        assert_eq!(p.time_basis, TimeBasis::Fixed(FixedOffset::west_opt(300 * 60).unwrap()));
        assert_eq!(BotConfig::default().notify_policy().time_basis, TimeBasis::Local);
    }

    #[test]
    fn oversized_interval_is_rejected_not_panicking() {
        let cfg = BotConfig {
            api_url: "https://example.test/queue".into(),
            discord_token: Secret::new("t"),
            guild_id: "1".into(),
            output_channel_id: "2".into(),
            stale_after_mins: i64::MAX / 2,
            ..BotConfig::default()
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("stale_after_mins"), "{err}");
        // Accessors stay total on unvalidated input.
        assert_eq!(cfg.stale_after(), Duration::minutes(MAX_INTERVAL_MINS));
    }
}
