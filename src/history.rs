//! Every queue sample ever observed, deduplicated by timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feed observation. Immutable once stored; `timestamp` is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// 0 means there is no queue.
    pub position: u32,
    #[serde(rename = "time", default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, position: u32, estimated_minutes: Option<u32>) -> Self {
        Self {
            timestamp,
            position,
            estimated_minutes,
        }
    }

    fn key(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Append-only set of samples keyed by millisecond timestamp.
///
/// Merging is a union: a timestamp that is already stored keeps its first
/// sample, so stored samples never change.
#[derive(Debug, Default, Clone)]
pub struct SampleStore {
    inner: BTreeMap<i64, Sample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples<I: IntoIterator<Item = Sample>>(samples: I) -> Self {
        let mut store = Self::new();
        store.merge(samples);
        store
    }

    /// Union `batch` into the store. Returns how many new timestamps were added.
    pub fn merge<I: IntoIterator<Item = Sample>>(&mut self, batch: I) -> usize {
        let mut added = 0;
        for s in batch {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.inner.entry(s.key()) {
                slot.insert(s);
                added += 1;
            }
        }
        added
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.inner.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All samples, ascending by timestamp.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.inner.values()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.inner.values().cloned().collect()
    }
}

/// Sort a batch ascending by timestamp and drop repeated timestamps (first one wins).
pub fn sorted_unique(batch: Vec<Sample>) -> Vec<Sample> {
    SampleStore::from_samples(batch).inner.into_values().collect()
}
