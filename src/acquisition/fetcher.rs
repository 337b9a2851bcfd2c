//! Telemetry fetcher
//!
//! Polls the device's two text endpoints and assembles one [`SensorReading`].
//! The calls are strictly sequential (`/raw_dht11` then `/raw_a`), each with
//! its own timeout, and any failure aborts the whole cycle: a partial reading
//! is never returned.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::calibration::{Calibration, CalibrationError};
use super::endpoint::EndpointReader;
use super::protocol::{parse_analog, parse_dht, Endpoint, ProtocolError};
use crate::config::defaults::{ANALOG_PATH, DHT_PATH, FETCH_TIMEOUT_MS};
use crate::types::SensorReading;

// ============================================================================
// Error Types
// ============================================================================

/// Failure categories seen by the acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Timeout, refused connection, DNS failure or non-2xx status
    Network,
    /// Payload did not match any known format
    Parse,
    /// Degenerate calibration or client configuration
    Config,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::Parse => write!(f, "parse"),
            FailureKind::Config => write!(f, "config"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("HTTP client could not be built: {0}")]
    Client(String),

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Failure category, or `None` for cancellation (which is not a failure).
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } | FetchError::Status { .. } => {
                Some(FailureKind::Network)
            }
            FetchError::Protocol(_) => Some(FailureKind::Parse),
            FetchError::Calibration(_) | FetchError::Client(_) => Some(FailureKind::Config),
            FetchError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// Anything the scheduler can poll for a complete reading.
///
/// Implementations must observe `cancel` and return [`FetchError::Cancelled`]
/// promptly once it fires.
#[async_trait]
pub trait TelemetrySource: Send + 'static {
    async fn fetch_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SensorReading, FetchError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// Fetches readings from the device over HTTP.
pub struct TelemetryFetcher {
    http: reqwest::Client,
    endpoint: EndpointReader,
    calibration: Calibration,
    timeout: Duration,
}

impl TelemetryFetcher {
    pub fn new(endpoint: EndpointReader, calibration: Calibration) -> Result<Self, FetchError> {
        Self::with_timeout(endpoint, calibration, Duration::from_millis(FETCH_TIMEOUT_MS))
    }

    pub fn with_timeout(
        endpoint: EndpointReader,
        calibration: Calibration,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("soilsense/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            calibration,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one fetch: both endpoints, parse, calibrate.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<SensorReading, FetchError> {
        // One read per cycle so both requests hit the same device.
        let base = self.endpoint.get_endpoint();

        let dht_text = self.get_text(&format!("{base}{DHT_PATH}"), Endpoint::Dht, cancel).await?;
        let dht = parse_dht(&dht_text)?;

        let analog_text = self
            .get_text(&format!("{base}{ANALOG_PATH}"), Endpoint::Analog, cancel)
            .await?;
        let analog = parse_analog(&analog_text)?;

        let reading = SensorReading::from_device(&dht, &analog, &self.calibration, Utc::now())?;
        debug!(
            moisture = reading.moisture_percent,
            raw = reading.raw_analog,
            temperature = reading.temperature_c,
            humidity = reading.humidity_percent,
            "Device reading assembled"
        );
        Ok(reading)
    }

    /// GET `url` as text under an independent timeout, abandoning it on cancel.
    async fn get_text(
        &self,
        url: &str,
        endpoint: Endpoint,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let request = async {
            let response = self.http.get(url).send().await.map_err(|e| self.transport(url, &e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            response.text().await.map_err(|e| self.transport(url, &e))
        };

        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.timeout, request) => match result {
                Ok(inner) => inner?,
                Err(_) => return Err(self.timed_out(url)),
            },
        };

        debug!(endpoint = %endpoint, payload = %text.trim(), "Device payload received");
        Ok(text)
    }

    fn transport(&self, url: &str, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            self.timed_out(url)
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    fn timed_out(&self, url: &str) -> FetchError {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[async_trait]
impl TelemetrySource for TelemetryFetcher {
    async fn fetch_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SensorReading, FetchError> {
        self.fetch(cancel).await
    }

    fn source_name(&self) -> &str {
        "device-http"
    }
}
