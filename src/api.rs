//! Optional status HTTP surface: `/health`, `/status`, `/metrics`.

use std::sync::{Arc, RwLock};

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::freshness::Classification;
use crate::metrics::Metrics;

/// What the last check saw and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub classification: Classification,
    pub position: Option<u32>,
    pub estimated_minutes: Option<u32>,
    pub sample_at: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
    pub label: String,
    pub forced: bool,
    pub notified: bool,
    pub history_len: usize,
}

/// Shared slot the scheduler writes and the HTTP handlers read.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<Option<StatusSnapshot>>>,
}

impl StatusHandle {
    pub fn publish(&self, snap: StatusSnapshot) {
        match self.inner.write() {
            Ok(mut g) => *g = Some(snap),
            Err(poison) => *poison.into_inner() = Some(snap),
        }
    }

    pub fn latest(&self) -> Option<StatusSnapshot> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

pub fn router(status: StatusHandle, metrics: Option<&Metrics>) -> Router {
    let mut r = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .with_state(status);
    if let Some(m) = metrics {
        r = r.merge(m.router());
    }
    r.layer(CorsLayer::very_permissive())
}

async fn get_status(State(status): State<StatusHandle>) -> Json<Option<StatusSnapshot>> {
    Json(status.latest())
}
