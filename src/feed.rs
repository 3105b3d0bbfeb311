// src/feed.rs
//! Queue feed: fetch the raw body, validate its shape, merge into history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FeedError;
use crate::history::{sorted_unique, Sample, SampleStore};
use crate::persist::HistoryFile;

/// Where raw feed bodies come from. One call = one request, no retries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_body(&self) -> Result<String, FeedError>;
    fn name(&self) -> &str;
}

pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch_body(&self) -> Result<String, FeedError> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }

    fn name(&self) -> &str {
        &self.url
    }
}

// Numbers in the feed show up both as JSON numbers and as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flex {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Flex {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Flex::Int(i) => Some(*i),
            Flex::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Flex::Float(_) => None,
            Flex::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|v| u32::try_from(v).ok())
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    ts: Option<Flex>,
    position: Option<Flex>,
    time: Option<Flex>,
}

fn body_sample(body: &str) -> String {
    body.chars().take(100).collect()
}

fn to_sample(raw: RawItem) -> Option<Sample> {
    let ts: DateTime<Utc> = raw
        .ts
        .as_ref()
        .and_then(Flex::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())?;
    let position = raw.position.as_ref().and_then(Flex::as_u32)?;
    let estimated_minutes = raw.time.as_ref().and_then(Flex::as_u32);
    Some(Sample::new(ts, position, estimated_minutes))
}

/// Parse a feed body into samples, ascending by timestamp, one per timestamp.
///
/// Anything other than an object with an `Items` array is a shape error.
/// Individual items that cannot be read are skipped.
pub fn parse_feed_body(body: &str) -> Result<Vec<Sample>, FeedError> {
    let shape_err = || FeedError::Shape {
        sample: body_sample(body),
    };
    let doc: Value = serde_json::from_str(body).map_err(|_| shape_err())?;
    let Some(Value::Array(items)) = doc.get("Items") else {
        return Err(shape_err());
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let parsed = RawItem::deserialize(item).ok().and_then(to_sample);
        match parsed {
            Some(s) => out.push(s),
            None => tracing::warn!(idx, item = %item, "skipping unreadable feed item"),
        }
    }
    Ok(sorted_unique(out))
}

/// Fetches the feed and keeps the full sample history, written through to disk.
pub struct FeedFetcher {
    source: Box<dyn FeedSource>,
    store: SampleStore,
    history: Option<HistoryFile>,
}

impl FeedFetcher {
    /// Fetcher without a history file.
    pub fn in_memory(source: Box<dyn FeedSource>) -> Self {
        Self {
            source,
            store: SampleStore::new(),
            history: None,
        }
    }

    /// Load previous history; an unreadable file starts empty.
    pub async fn hydrate(source: Box<dyn FeedSource>, history: HistoryFile) -> Self {
        let store = match history.load().await {
            Ok(samples) => SampleStore::from_samples(samples),
            Err(e) => {
                tracing::warn!(error = %e, path = %history.path().display(), "history read failed");
                SampleStore::new()
            }
        };
        tracing::info!(samples = store.len(), "history loaded");
        Self {
            source,
            store,
            history: Some(history),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// One fetch. Returns this batch only, sorted ascending.
    pub async fn fetch(&mut self) -> Result<Vec<Sample>, FeedError> {
        let body = self.source.fetch_body().await?;
        let batch = parse_feed_body(&body)?;
        let added = self.store.merge(batch.iter().cloned());
        tracing::debug!(batch = batch.len(), added, total = self.store.len(), "feed merged");

        if let Some(history) = &self.history {
            if let Err(e) = history.save(&self.store.to_vec()).await {
                tracing::warn!(error = %e, path = %history.path().display(), "history write failed");
            }
        }
        Ok(batch)
    }
}
