use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("queue_checks_total", "Status checks run, by classification.");
        describe_counter!("queue_notifications_total", "Status messages posted, by bucket.");
        describe_counter!(
            "queue_notifications_suppressed_total",
            "Checks that did not post because of the throttle."
        );
        describe_counter!("queue_feed_errors_total", "Feed fetch failures, by kind.");
        describe_counter!("queue_chat_errors_total", "Chat platform call failures.");
        describe_gauge!("queue_position", "Latest fresh queue position.");
        describe_gauge!("queue_last_check_ts", "Unix ts of the last status check.");
    });
}
