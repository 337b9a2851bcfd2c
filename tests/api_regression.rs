//! HTTP API regression tests, driven in-process with `oneshot`.

mod common;

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{ScriptedSource, Step};
use soilsense::acquisition::{Calibration, DemoSimulator, EndpointResolver};
use soilsense::api::{create_app, ApiState};
use soilsense::config::{DeviceSettings, SettingsStore};
use soilsense::pipeline::{AcquisitionScheduler, SchedulerOptions};
use soilsense::ConnectionState;

fn demo_scheduler() -> AcquisitionScheduler<ScriptedSource> {
    AcquisitionScheduler::new(
        ScriptedSource::new([], Step::Fail),
        DemoSimulator::new(Calibration::default(), Some(5)),
        EndpointResolver::default(),
        SchedulerOptions::default(),
    )
}

fn app_for(scheduler: &AcquisitionScheduler<ScriptedSource>, settings_path: &Path) -> Router {
    let store = SettingsStore::new(settings_path.to_path_buf(), DeviceSettings::default());
    create_app(ApiState::new(scheduler.handle(), Arc::new(store)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn demo_telemetry_is_flagged_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = demo_scheduler();
    scheduler.run_cycle().await;
    assert_eq!(scheduler.state(), ConnectionState::Demo);
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));

    let (status, body) = call(&app, Method::GET, "/api/v2/telemetry/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["demo"], true);
    assert_eq!(body["meta"]["connection"], "demo");
    assert_eq!(body["data"]["demo"], true);
    assert_eq!(body["data"]["reading"]["source"], "simulated");

    let (status, body) = call(&app, Method::GET, "/api/v2/telemetry/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["moisture"].as_array().unwrap().len(), 10);
    assert_eq!(body["data"]["humidity"].as_array().unwrap().len(), 10);

    let (status, body) = call(&app, Method::GET, "/api/v2/connection", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "demo");
    assert_eq!(body["data"]["endpoint"], "http://192.168.4.1");
    assert_eq!(body["data"]["stats"]["failures"], 1);
}

#[tokio::test]
async fn live_before_first_cycle_has_no_reading() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = demo_scheduler();
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));

    let (status, body) = call(&app, Method::GET, "/api/v2/telemetry/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "connecting");
    assert!(body["data"]["reading"].is_null());
    assert_eq!(body["meta"]["demo"], false);
}

#[tokio::test]
async fn retry_is_queued_for_the_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = demo_scheduler();
    scheduler.run_cycle().await;
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));

    let (status, body) = call(&app, Method::POST, "/api/v2/connection/retry", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["command"], "retry");

    // Nothing changes until the scheduler picks the command up.
    assert_eq!(scheduler.state(), ConnectionState::Demo);
    assert!(!scheduler.apply_pending_commands());
    assert_eq!(scheduler.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn refresh_requests_an_immediate_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut scheduler = demo_scheduler();
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));

    let (status, _) = call(&app, Method::POST, "/api/v2/telemetry/refresh", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(scheduler.apply_pending_commands());
}

#[tokio::test]
async fn settings_updates_are_validated_persisted_and_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    let mut scheduler = demo_scheduler();
    let app = app_for(&scheduler, &path);

    let (status, body) = call(&app, Method::GET, "/api/v2/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["device_ip"], "192.168.4.1");
    assert_eq!(body["data"]["poll_interval_ms"], 5000);
    assert_eq!(body["data"]["poll_interval_presets_ms"].as_array().unwrap().len(), 6);

    let invalid = serde_json::json!({ "poll_interval_ms": 1234 });
    let (status, body) = call(&app, Method::PUT, "/api/v2/settings", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(!path.exists());

    let invalid = serde_json::json!({ "device_ip": "not an address!" });
    let (status, _) = call(&app, Method::PUT, "/api/v2/settings", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let update = serde_json::json!({ "device_ip": " 10.0.0.9 ", "poll_interval_ms": 2000 });
    let (status, body) = call(&app, Method::PUT, "/api/v2/settings", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["device_ip"], "10.0.0.9");
    assert_eq!(body["data"]["poll_interval_ms"], 2000);

    let saved = DeviceSettings::load_from_file(&path).unwrap();
    assert_eq!(saved.device_ip, "10.0.0.9");
    assert_eq!(saved.poll_interval_ms, 2000);

    assert!(!scheduler.apply_pending_commands());
    assert_eq!(scheduler.poll_interval().as_millis(), 2000);
    assert_eq!(scheduler.handle().endpoint(), "http://10.0.0.9");
}

#[tokio::test]
async fn commands_fail_with_503_once_acquisition_stops() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = demo_scheduler();
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));
    drop(scheduler);

    let (status, body) = call(&app, Method::POST, "/api/v2/connection/reset", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    // Reads keep serving the last published snapshot.
    let (status, _) = call(&app, Method::GET, "/api/v2/connection", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = demo_scheduler();
    let app = app_for(&scheduler, &dir.path().join("settings.toml"));

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = call(&app, Method::GET, "/api/v2/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
