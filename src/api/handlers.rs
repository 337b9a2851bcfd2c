//! API request handlers
//!
//! Handlers only read the published [`TelemetrySnapshot`] or send commands
//! through the [`SchedulerHandle`]; none of them touch scheduler state.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::envelope::{ApiError, ApiResponse};
use crate::config::defaults::POLL_INTERVAL_PRESETS_MS;
use crate::config::watcher::forward_changes;
use crate::config::{DeviceSettings, SettingsStore, SettingsUpdate};
use crate::pipeline::{CycleStats, HistorySeries, SchedulerHandle, TelemetrySnapshot};
use crate::types::{ConnectionState, SensorReading};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
    pub settings: Arc<SettingsStore>,
}

impl ApiState {
    pub fn new(scheduler: SchedulerHandle, settings: Arc<SettingsStore>) -> Self {
        Self { scheduler, settings }
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        self.scheduler.snapshot()
    }
}

// ============================================================================
// Response Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LiveTelemetry {
    pub state: ConnectionState,
    pub demo: bool,
    pub reading: Option<SensorReading>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub demo: bool,
    pub endpoint: String,
    pub poll_interval_ms: u64,
    pub stats: CycleStats,
}

#[derive(Debug, Serialize)]
pub struct SettingsView {
    #[serde(flatten)]
    pub settings: DeviceSettings,
    pub poll_interval_presets_ms: &'static [u64],
}

impl From<DeviceSettings> for SettingsView {
    fn from(settings: DeviceSettings) -> Self {
        Self {
            settings,
            poll_interval_presets_ms: &POLL_INTERVAL_PRESETS_MS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub command: &'static str,
}

// ============================================================================
// Telemetry
// ============================================================================

/// GET /api/v2/telemetry/live
pub async fn live_telemetry(State(state): State<ApiState>) -> Response {
    let snap = state.snapshot();
    let body = LiveTelemetry {
        state: snap.state,
        demo: snap.demo,
        reading: snap.latest,
        updated_at: snap.updated_at,
    };
    ApiResponse::telemetry(body, snap.state)
}

/// GET /api/v2/telemetry/history
pub async fn telemetry_history(State(state): State<ApiState>) -> Response {
    let snap = state.snapshot();
    ApiResponse::<HistorySeries>::telemetry(snap.history, snap.state)
}

/// POST /api/v2/telemetry/refresh
pub async fn refresh(State(state): State<ApiState>) -> Result<Response, ApiError> {
    state.scheduler.refresh_now().await?;
    Ok(ApiResponse::accepted(CommandAccepted { command: "refresh" }))
}

// ============================================================================
// Connection
// ============================================================================

/// GET /api/v2/connection
pub async fn connection_status(State(state): State<ApiState>) -> Response {
    let snap = state.snapshot();
    let body = ConnectionStatus {
        state: snap.state,
        demo: snap.demo,
        endpoint: snap.endpoint,
        poll_interval_ms: snap.poll_interval_ms,
        stats: snap.stats,
    };
    ApiResponse::telemetry(body, snap.state)
}

/// POST /api/v2/connection/retry
pub async fn retry_connection(State(state): State<ApiState>) -> Result<Response, ApiError> {
    state.scheduler.retry().await?;
    Ok(ApiResponse::accepted(CommandAccepted { command: "retry" }))
}

/// POST /api/v2/connection/reset
pub async fn reset_connection(State(state): State<ApiState>) -> Result<Response, ApiError> {
    state.scheduler.reset().await?;
    Ok(ApiResponse::accepted(CommandAccepted { command: "reset" }))
}

// ============================================================================
// Settings
// ============================================================================

/// GET /api/v2/settings
pub async fn get_settings(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(SettingsView::from(state.settings.current().await))
}

/// PUT /api/v2/settings
///
/// Validates, persists, then forwards the changed fields to the scheduler.
pub async fn update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Response, ApiError> {
    let (settings, changes) = state.settings.update(&update).await?;
    forward_changes(&state.scheduler, &changes).await?;
    Ok(ApiResponse::ok(SettingsView::from(settings)))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
