//! REST API module using Axum
//!
//! Read-only view of the acquisition pipeline plus the few commands an
//! operator needs (retry, reset, refresh, device settings):
//! - `/api/v2/...` with the `{data, meta}` envelope
//! - `/health` liveness probe

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Comma-separated list of origins allowed to call the API cross-origin.
pub const CORS_ORIGINS_ENV_VAR: &str = "SOILSENSE_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ORIGINS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v2", routes::v2_api_routes(state))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
