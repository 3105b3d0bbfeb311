// tests/status_http.rs
//
// HTTP-level tests for the status router without opening sockets.

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use queue_watch_bot::api::{self, StatusHandle, StatusSnapshot};
use queue_watch_bot::Classification;

const BODY_LIMIT: usize = 64 * 1024;

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, bytes.to_vec())
}

#[tokio::test]
async fn health_is_ok() {
    let app = api::router(StatusHandle::default(), None);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn status_is_null_before_first_check() {
    let app = api::router(StatusHandle::default(), None);
    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).expect("json");
    assert!(v.is_null());
}

#[tokio::test]
async fn status_reports_latest_snapshot() {
    let handle = StatusHandle::default();
    let app = api::router(handle.clone(), None);
    let checked = Utc.with_ymd_and_hms(2025, 9, 6, 18, 0, 0).unwrap();

    handle.publish(StatusSnapshot {
        classification: Classification::Fresh,
        position: Some(412),
        estimated_minutes: Some(31),
        sample_at: Some(checked),
        checked_at: checked,
        label: "Queue: 412".into(),
        forced: false,
        notified: true,
        history_len: 9,
    });

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).expect("json");
    assert_eq!(v["classification"], "FRESH");
    assert_eq!(v["position"], 412);
    assert_eq!(v["label"], "Queue: 412");
    assert_eq!(v["history_len"], 9);
    assert_eq!(v["notified"], true);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = api::router(StatusHandle::default(), None);
    let (status, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
