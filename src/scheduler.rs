// src/scheduler.rs
//! Connection state machine and the fetch → classify → throttle → notify pipeline.
//!
//! One task owns all mutable state. Ticks and forced commands are multiplexed
//! with `select!`, so the cursor read-modify-write can never interleave.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::api::{StatusHandle, StatusSnapshot};
use crate::clock::Clock;
use crate::commands::Command;
use crate::error::ChatError;
use crate::feed::FeedFetcher;
use crate::freshness::{classify, Classification};
use crate::history::Sample;
use crate::notify::{render_status, room_label, ChatPlatform, ChatTarget, RenderContext};
use crate::throttle::{Bucket, Throttle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Credentials rejected; the loop has stopped.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        }
    }
}

/// Doubling delay, capped. Attempts themselves are unbounded.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.policy.base.saturating_mul(factor).min(self.policy.cap)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub server_id: String,
    pub room_id: String,
    pub tick_interval: Duration,
    pub stale_after: ChronoDuration,
    pub ignore_stale_notifications: bool,
    pub backoff: BackoffPolicy,
    pub render: RenderContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Tick,
    /// On-demand check; the reply goes to `reply_room`.
    Forced { reply_room: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub classification: Classification,
    pub latest: Option<Sample>,
    /// A status message was posted.
    pub notified: bool,
    pub label: String,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    chat: Arc<dyn ChatPlatform>,
    fetcher: FeedFetcher,
    throttle: Throttle,
    clock: Arc<dyn Clock>,
    status: StatusHandle,
    state: ConnectionState,
    target: Option<ChatTarget>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        chat: Arc<dyn ChatPlatform>,
        fetcher: FeedFetcher,
        throttle: Throttle,
        clock: Arc<dyn Clock>,
        status: StatusHandle,
    ) -> Self {
        crate::metrics::ensure_described();
        Self {
            settings,
            chat,
            fetcher,
            throttle,
            clock,
            status,
            state: ConnectionState::Disconnected,
            target: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    /// Connect and resolve the output room, retrying with backoff until it works.
    /// Only a rejected token ends the retries.
    pub async fn ensure_connected(&mut self) -> Result<ChatTarget, ChatError> {
        if let Some(t) = &self.target {
            return Ok(t.clone());
        }
        self.state = ConnectionState::Connecting;
        let mut backoff = Backoff::new(self.settings.backoff);
        loop {
            match self.try_connect().await {
                Ok(target) => {
                    tracing::info!(
                        server = %target.server_name,
                        room = %target.room_name,
                        attempts = backoff.attempts() + 1,
                        "connected"
                    );
                    self.state = ConnectionState::Connected;
                    self.target = Some(target.clone());
                    return Ok(target);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "cannot connect to chat platform");
                    self.state = ConnectionState::Fatal;
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "waiting to connect"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<ChatTarget, ChatError> {
        let me = self.chat.connect().await?;
        tracing::debug!(bot = %me.username, id = %me.id, "token accepted");
        self.chat
            .resolve_target(&self.settings.server_id, &self.settings.room_id)
            .await
    }

    /// `room` is the room a post went to; `None` for server-wide calls.
    fn on_chat_error(&mut self, e: &ChatError, op: &'static str, room: Option<&str>) {
        counter!("queue_chat_errors_total", "op" => op).increment(1);
        tracing::warn!(error = %e, op, room, "chat call failed");
        // A missing reply room says nothing about the output target.
        let hits_target = room.map_or(true, |r| r == self.settings.room_id);
        if hits_target && matches!(e, ChatError::NotFound(_)) {
            self.target = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    /// One pass of the pipeline. Never fails: every error is logged and absorbed.
    pub async fn check(&mut self, trigger: Trigger) -> CheckOutcome {
        let now = self.clock.now();
        let forced = matches!(trigger, Trigger::Forced { .. });

        let latest = match self.fetcher.fetch().await {
            Ok(batch) => batch.last().cloned(),
            Err(e) => {
                counter!("queue_feed_errors_total", "kind" => e.kind()).increment(1);
                tracing::warn!(error = %e, kind = e.kind(), "The API may not be functioning correctly");
                None
            }
        };
        let classification = classify(latest.as_ref(), now, self.settings.stale_after);
        counter!("queue_checks_total", "classification" => classification.as_str()).increment(1);
        gauge!("queue_last_check_ts").set(now.timestamp() as f64);

        let mut due = self.throttle.should_notify(classification, now, forced);
        if due
            && !forced
            && classification == Classification::Stale
            && self.settings.ignore_stale_notifications
        {
            tracing::debug!("stale notification skipped by configuration");
            due = false;
        }

        let mut notified = false;
        if due {
            let room = match &trigger {
                Trigger::Tick => self.settings.room_id.clone(),
                Trigger::Forced { reply_room } => reply_room.clone(),
            };
            // Stamp first so a failed or slow send cannot cause a duplicate next tick.
            self.throttle.record_notified(classification, now).await;
            let msg = render_status(classification, latest.as_ref(), now, &self.settings.render);
            match self.chat.post(&room, &msg).await {
                Ok(()) => {
                    notified = true;
                    let bucket = Bucket::for_classification(classification);
                    counter!("queue_notifications_total", "bucket" => bucket.as_str()).increment(1);
                    tracing::info!(%classification, bucket = bucket.as_str(), forced, room = %room, "status posted");
                }
                Err(e) => self.on_chat_error(&e, "post", Some(room.as_str())),
            }
        } else {
            counter!("queue_notifications_suppressed_total").increment(1);
            tracing::debug!(%classification, "notification throttled");
        }

        let label = room_label(classification, latest.as_ref());
        if let Err(e) = self.chat.rename_label(&self.settings.server_id, &label).await {
            self.on_chat_error(&e, "rename", None);
        }

        if let (Classification::Fresh, Some(s)) = (classification, latest.as_ref()) {
            gauge!("queue_position").set(f64::from(s.position));
        }
        tracing::info!(
            %classification,
            position = latest.as_ref().map(|s| s.position),
            forced,
            notified,
            "queue checked"
        );

        self.status.publish(StatusSnapshot {
            classification,
            position: latest.as_ref().map(|s| s.position),
            estimated_minutes: latest.as_ref().and_then(|s| s.estimated_minutes),
            sample_at: latest.as_ref().map(|s| s.timestamp),
            checked_at: now,
            label: label.clone(),
            forced,
            notified,
            history_len: self.fetcher.store().len(),
        });

        CheckOutcome {
            classification,
            latest,
            notified,
            label,
        }
    }

    /// Run until the process ends. Returns only if the chat credentials are rejected.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), ChatError> {
        self.ensure_connected().await?;

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            tick_secs = self.settings.tick_interval.as_secs(),
            feed = %self.fetcher.source_name(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.ensure_connected().await?;
                    self.check(Trigger::Tick).await;
                }
                Some(cmd) = commands.recv() => {
                    self.ensure_connected().await?;
                    match cmd {
                        Command::ForceCheck { reply_room, requested_by } => {
                            tracing::info!(%requested_by, room = %reply_room, "forced check");
                            self.check(Trigger::Forced { reply_room }).await;
                        }
                    }
                }
            }
        }
    }
}
