// tests/common/mod.rs
// Shared test doubles: a recording chat platform, a scripted feed, a scheduler harness.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use queue_watch_bot::api::StatusHandle;
use queue_watch_bot::clock::ManualClock;
use queue_watch_bot::error::{ChatError, FeedError};
use queue_watch_bot::feed::{FeedFetcher, FeedSource};
use queue_watch_bot::notify::{
    BotIdentity, ChatPlatform, ChatTarget, InboundMessage, RenderContext, StatusMessage,
};
use queue_watch_bot::persist::CursorFile;
use queue_watch_bot::scheduler::{BackoffPolicy, Scheduler, SchedulerSettings};
use queue_watch_bot::throttle::{NotifyPolicy, Throttle};

pub const SERVER_ID: &str = "100";
pub const ROOM_ID: &str = "200";

#[derive(Default)]
pub struct MockChat {
    pub posts: Mutex<Vec<(String, StatusMessage)>>,
    pub renames: Mutex<Vec<String>>,
    pub connect_calls: Mutex<u32>,
    /// Fail this many connects with a 503 before succeeding.
    pub connect_failures: Mutex<u32>,
    pub reject_token: Mutex<bool>,
    pub post_not_found: Mutex<bool>,
    pub inbox: Mutex<Vec<InboundMessage>>,
}

impl MockChat {
    pub fn posts(&self) -> Vec<(String, StatusMessage)> {
        self.posts.lock().clone()
    }

    pub fn renames(&self) -> Vec<String> {
        self.renames.lock().clone()
    }
}

#[async_trait]
impl ChatPlatform for MockChat {
    async fn connect(&self) -> Result<BotIdentity, ChatError> {
        *self.connect_calls.lock() += 1;
        if *self.reject_token.lock() {
            return Err(ChatError::Unauthorized);
        }
        let mut left = self.connect_failures.lock();
        if *left > 0 {
            *left -= 1;
            return Err(ChatError::Status {
                status: 503,
                body: "gateway unavailable".into(),
            });
        }
        Ok(BotIdentity {
            id: "1".into(),
            username: "queue-bot".into(),
        })
    }

    async fn resolve_target(&self, server_id: &str, room_id: &str) -> Result<ChatTarget, ChatError> {
        Ok(ChatTarget {
            server_id: server_id.into(),
            server_name: "Test Guild".into(),
            room_id: room_id.into(),
            room_name: "queue".into(),
        })
    }

    async fn post(&self, room_id: &str, msg: &StatusMessage) -> Result<(), ChatError> {
        if *self.post_not_found.lock() {
            return Err(ChatError::NotFound(format!("channel {room_id}")));
        }
        self.posts.lock().push((room_id.to_string(), msg.clone()));
        Ok(())
    }

    async fn rename_label(&self, _server_id: &str, label: &str) -> Result<(), ChatError> {
        self.renames.lock().push(label.to_string());
        Ok(())
    }

    async fn poll_messages(&self, _room_id: &str) -> Result<Vec<InboundMessage>, ChatError> {
        Ok(std::mem::take(&mut *self.inbox.lock()))
    }
}

pub enum FeedReply {
    Body(String),
    Down,
}

/// Feed that answers from a queue; an empty queue answers with an empty array.
#[derive(Clone, Default)]
pub struct ScriptedFeed {
    replies: Arc<Mutex<VecDeque<FeedReply>>>,
}

impl ScriptedFeed {
    pub fn push_body(&self, body: impl Into<String>) {
        self.replies.lock().push_back(FeedReply::Body(body.into()));
    }

    pub fn push_down(&self) {
        self.replies.lock().push_back(FeedReply::Down);
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_body(&self) -> Result<String, FeedError> {
        match self.replies.lock().pop_front() {
            Some(FeedReply::Body(b)) => Ok(b),
            Some(FeedReply::Down) => Err(FeedError::Status { status: 503 }),
            None => Ok(r#"{"Items":[]}"#.to_string()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Feed body in the service's wire format.
pub fn feed_body(samples: &[(DateTime<Utc>, u32, Option<u32>)]) -> String {
    let items: Vec<_> = samples
        .iter()
        .map(|(ts, pos, est)| json!({ "ts": ts.timestamp_millis(), "position": pos, "time": est }))
        .collect();
    json!({ "Items": items, "Count": samples.len(), "ScannedCount": samples.len() }).to_string()
}

pub fn single_sample(ts: DateTime<Utc>, position: u32) -> String {
    feed_body(&[(ts, position, Some(12))])
}

pub fn settings() -> SchedulerSettings {
    SchedulerSettings {
        server_id: SERVER_ID.into(),
        room_id: ROOM_ID.into(),
        tick_interval: Duration::from_secs(600),
        stale_after: ChronoDuration::minutes(30),
        ignore_stale_notifications: false,
        backoff: BackoffPolicy {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        },
        render: RenderContext::default(),
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub chat: Arc<MockChat>,
    pub feed: ScriptedFeed,
    pub clock: Arc<ManualClock>,
    pub status: StatusHandle,
    pub dir: TempDir,
}

impl Harness {
    pub fn cursor_file(&self) -> CursorFile {
        CursorFile::new(self.dir.path().join("__cache.json"))
    }
}

pub async fn harness(start: DateTime<Utc>, tweak: impl FnOnce(&mut SchedulerSettings)) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(MockChat::default());
    let feed = ScriptedFeed::default();
    let clock = Arc::new(ManualClock::new(start));
    let status = StatusHandle::default();

    let mut s = settings();
    tweak(&mut s);

    let throttle = Throttle::hydrate(
        NotifyPolicy::default(),
        CursorFile::new(dir.path().join("__cache.json")),
    )
    .await;
    let fetcher = FeedFetcher::in_memory(Box::new(feed.clone()));
    let scheduler = Scheduler::new(
        s,
        chat.clone() as Arc<dyn ChatPlatform>,
        fetcher,
        throttle,
        clock.clone(),
        status.clone(),
    );

    Harness {
        scheduler,
        chat,
        feed,
        clock,
        status,
        dir,
    }
}
