//! v2 API route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn v2_api_routes(state: ApiState) -> Router {
    Router::new()
        // Telemetry
        .route("/telemetry/live", get(handlers::live_telemetry))
        .route("/telemetry/history", get(handlers::telemetry_history))
        .route("/telemetry/refresh", post(handlers::refresh))
        // Connection
        .route("/connection", get(handlers::connection_status))
        .route("/connection/retry", post(handlers::retry_connection))
        .route("/connection/reset", post(handlers::reset_connection))
        // Settings
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .with_state(state)
}
