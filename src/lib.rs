// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod freshness;
pub mod history;
pub mod metrics;
pub mod notify;
pub mod persist;
pub mod scheduler;
pub mod throttle;

// ---- Re-exports for stable public API ----
pub use crate::config::BotConfig;
pub use crate::freshness::Classification;
pub use crate::history::{Sample, SampleStore};
pub use crate::scheduler::{Scheduler, Trigger};
