//! Integration tests for the HTTP API
//!
//! Sessions run on background tasks, so state changes caused by commands
//! are observed by polling the snapshot endpoint.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pacer::core::{
    create_router, create_router_with_state, AmbientAction, AppState, SessionUpdate, SystemClock,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceExt;

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn create(app: &Router, body: &str) -> String {
    let (status, json) = send(app, "POST", "/session/new", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "create failed: {}", json);
    json["session_id"].as_str().unwrap().to_string()
}

async fn wait_for(app: &Router, id: &str, check: impl Fn(&Value) -> bool) -> Value {
    let uri = format!("/session/{}", id);
    for _ in 0..200 {
        let (status, snapshot) = send(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot never reached the expected state");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_router();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions_active"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_create_session_defaults_to_breathing() {
    let app = create_router();
    let (status, json) = send(&app, "POST", "/session/new", Some("{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["table"], "breathing");
    assert!(json["websocket_url"].as_str().unwrap().starts_with("/ws/"));
    assert_eq!(json["snapshot"]["status"], "RUNNING");
    assert_eq!(json["snapshot"]["phase_name"], "INHALE");
    assert_eq!(json["snapshot"]["total_remaining"], 180.0);

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 1);
}

#[tokio::test]
async fn test_unknown_preset_is_rejected() {
    let app = create_router();
    let (status, json) = send(&app, "POST", "/session/new", Some(r#"{"preset": "yoga"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("yoga"));
}

#[tokio::test]
async fn test_invalid_inline_table_is_rejected() {
    let app = create_router();
    let body = r#"{"table": {"name": "broken", "phases": []}}"#;
    let (status, json) = send(&app, "POST", "/session/new", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("broken"));
}

/// Wait for a specific update, skipping ticks and anything else
async fn expect_update(rx: &mut broadcast::Receiver<SessionUpdate>, wanted: SessionUpdate) {
    let found = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(update) if update == wanted => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    })
    .await;
    assert_eq!(found, Ok(true), "never saw {:?}", wanted);
}

#[tokio::test]
async fn test_interval_too_large_for_a_duration_is_rejected() {
    let app = create_router();
    for interval in ["1e20", "1e-12"] {
        let body = format!(
            r#"{{"table": {{
                "name": "odd",
                "cadence": {{"kind": "fixed", "interval_secs": {}}},
                "phases": [{{"name": "A", "label": "a", "advance": "timer", "duration_secs": 5.0}}]
            }}}}"#,
            interval
        );
        let (status, json) = send(&app, "POST", "/session/new", Some(&body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "interval {}", interval);
        assert!(json["error"].as_str().unwrap().contains("tick interval"));
    }

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 0);
}

#[tokio::test]
async fn test_pause_and_resume_reach_subscribers() {
    let state = Arc::new(AppState::new(Arc::new(SystemClock::new())));
    let app = create_router_with_state(state.clone());
    let id = create(&app, r#"{"preset": "meditation"}"#).await;
    let mut rx = state.subscribe(&id).await.unwrap();

    send(&app, "POST", &format!("/session/{}/pause", id), None).await;
    expect_update(&mut rx, SessionUpdate::Paused).await;
    expect_update(&mut rx, SessionUpdate::Ambient { action: AmbientAction::Pause }).await;

    send(&app, "POST", &format!("/session/{}/resume", id), None).await;
    expect_update(&mut rx, SessionUpdate::Resumed).await;
    expect_update(&mut rx, SessionUpdate::Ambient { action: AmbientAction::Play }).await;

    // Intro cue is still being narrated when the user quits
    send(&app, "POST", &format!("/session/{}/quit", id), None).await;
    expect_update(&mut rx, SessionUpdate::CueCancelled).await;
    expect_update(&mut rx, SessionUpdate::Ambient { action: AmbientAction::Stop }).await;
    expect_update(&mut rx, SessionUpdate::Abandoned).await;
}

#[tokio::test]
async fn test_finished_sessions_leave_the_live_map() {
    let state = Arc::new(AppState::new(Arc::new(SystemClock::new())));
    let app = create_router_with_state(state.clone());
    let id = create(&app, r#"{"preset": "breathing"}"#).await;
    assert!(state.sessions.read().await.contains_key(&id));

    send(&app, "POST", &format!("/session/{}/quit", id), None).await;

    let mut retired = false;
    for _ in 0..200 {
        if !state.sessions.read().await.contains_key(&id) {
            retired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(retired, "session still in the live map after quit");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 0);
    assert_eq!(health["sessions_finished"], 1);

    // Last snapshot stays readable; commands are refused
    let (status, snapshot) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "ABANDONED");
    let (status, _) = send(&app, "POST", &format!("/session/{}/skip", id), None).await;
    assert_eq!(status, StatusCode::GONE);
    let (status, _) = send(&app, "POST", &format!("/session/{}/cue/1/done", id), None).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_inline_table_session() {
    let app = create_router();
    let body = r#"{"table": {
        "name": "stretch",
        "phases": [
            {"name": "READY", "label": "Get ready", "advance": "signal"},
            {"name": "HOLD", "label": "Hold", "advance": "timer", "duration_secs": 30.0}
        ]
    }}"#;
    let id = create(&app, body).await;

    let snapshot = wait_for(&app, &id, |s| s["phase_name"] == "READY").await;
    assert_eq!(snapshot["target"]["kind"], "signal");

    let (status, _) = send(&app, "POST", &format!("/session/{}/gate", id), None).await;
    assert_eq!(status, StatusCode::OK);
    wait_for(&app, &id, |s| s["phase_name"] == "HOLD").await;
}

#[tokio::test]
async fn test_session_not_found() {
    let app = create_router();

    let (status, _) = send(&app, "GET", "/session/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/session/nonexistent/pause", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/session/nonexistent/cue/1/done", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_meditation_flow() {
    let app = create_router();
    let id = create(&app, r#"{"preset": "meditation"}"#).await;

    // Intro cue was handed to the client; the guide waits for it
    let snapshot = wait_for(&app, &id, |s| s["phase_name"] == "GUIDE").await;
    assert_eq!(snapshot["status"], "RUNNING");

    // Utterance ids start at 1; finishing the intro continues the session
    let (status, _) = send(&app, "POST", &format!("/session/{}/cue/1/done", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = wait_for(&app, &id, |s| s["phase_name"] == "TIMER").await;
    assert_eq!(snapshot["phases_completed"], 1);

    send(&app, "POST", &format!("/session/{}/pause", id), None).await;
    wait_for(&app, &id, |s| s["paused"] == true).await;

    send(&app, "POST", &format!("/session/{}/resume", id), None).await;
    wait_for(&app, &id, |s| s["paused"] == false).await;

    send(&app, "POST", &format!("/session/{}/quit", id), None).await;
    let snapshot = wait_for(&app, &id, |s| s["status"] == "ABANDONED").await;
    assert_eq!(snapshot["reason"], "R005_ABANDONED");

    // Session task is gone; further commands are refused
    let mut status = StatusCode::OK;
    for _ in 0..50 {
        let (s, _) = send(&app, "POST", &format!("/session/{}/skip", id), None).await;
        status = s;
        if status == StatusCode::GONE {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_neck_samples_from_landmarks() {
    let app = create_router();
    let id = create(&app, r#"{"preset": "neck"}"#).await;
    wait_for(&app, &id, |s| s["phase_name"] == "HOLD_DOWN").await;

    // Too few landmarks: the frame carries no reading
    let body = r#"{"landmarks": [{"x": 0.5, "y": 0.5}]}"#;
    let (status, _) = send(&app, "POST", &format!("/session/{}/sample", id), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = wait_for(&app, &id, |s| s["reason"] == "R003_SAMPLE_MISSING").await;
    assert_eq!(snapshot["phase_elapsed"], 0.0);

    let (status, _) = send(&app, "POST", &format!("/session/{}/sample", id), Some(r#"{"ratio": 0.5}"#)).await;
    assert_eq!(status, StatusCode::OK);
    wait_for(&app, &id, |s| s["reason"] == "R003_CONDITION_NOT_MET").await;
}

#[tokio::test]
async fn test_skip_through_neck_session() {
    let app = create_router();
    let id = create(&app, r#"{"preset": "neck"}"#).await;

    for _ in 0..3 {
        let (status, _) = send(&app, "POST", &format!("/session/{}/skip", id), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let snapshot = wait_for(&app, &id, |s| s["status"] == "COMPLETED").await;
    assert_eq!(snapshot["phases_completed"], 0);
}
