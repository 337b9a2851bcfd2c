//! Shared data structures for soil telemetry acquisition
//!
//! - `SensorReading`: one complete snapshot from a device or the demo simulator
//! - `ReadingSource`: tags every reading as measured or synthetic
//! - `ConnectionState`: the acquisition state machine's current state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acquisition::calibration::{Calibration, CalibrationError};
use crate::acquisition::protocol::{AnalogPayload, DhtPayload};

// ============================================================================
// Readings
// ============================================================================

/// Where a reading came from.
///
/// Simulated readings are always tagged so that consumers never present
/// synthetic values as measurements.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// Fetched from the physical device over HTTP
    Device,
    /// Produced locally by the demo simulator
    Simulated,
}

impl ReadingSource {
    pub fn is_synthetic(self) -> bool {
        matches!(self, ReadingSource::Simulated)
    }
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingSource::Device => write!(f, "device"),
            ReadingSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// Immutable snapshot produced by one acquisition cycle.
///
/// `moisture_percent` is always the calibrated value of `raw_analog`; the
/// constructors derive it and there is no way to set it independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Calibrated soil moisture (0-100 %)
    pub moisture_percent: u8,
    /// Air temperature (°C)
    pub temperature_c: f64,
    /// Relative air humidity (%)
    pub humidity_percent: f64,
    /// Heat index (°C); equals temperature when the device omits it
    pub heat_index_c: f64,
    /// Uncalibrated ADC value from the moisture probe
    pub raw_analog: i32,
    /// Upper divider resistance (Ω), newer firmware only
    pub resistance_top_ohms: Option<f64>,
    /// Lower divider resistance (Ω), newer firmware only
    pub resistance_bottom_ohms: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: ReadingSource,
}

impl SensorReading {
    /// Assemble a device reading from the two parsed endpoint payloads.
    pub fn from_device(
        dht: &DhtPayload,
        analog: &AnalogPayload,
        calibration: &Calibration,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CalibrationError> {
        Ok(Self {
            moisture_percent: calibration.moisture_percent(analog.raw_value)?,
            temperature_c: dht.temperature,
            humidity_percent: dht.humidity,
            heat_index_c: dht.heat_index_or_temperature(),
            raw_analog: analog.raw_value,
            resistance_top_ohms: analog.resistance_top,
            resistance_bottom_ohms: analog.resistance_bottom,
            timestamp,
            source: ReadingSource::Device,
        })
    }

    /// Build a synthetic reading. Moisture is still derived from `raw_analog`.
    pub fn simulated(
        raw_analog: i32,
        temperature_c: f64,
        humidity_percent: f64,
        heat_index_c: f64,
        calibration: &Calibration,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CalibrationError> {
        Ok(Self {
            moisture_percent: calibration.moisture_percent(raw_analog)?,
            temperature_c,
            humidity_percent,
            heat_index_c,
            raw_analog,
            resistance_top_ohms: None,
            resistance_bottom_ohms: None,
            timestamp,
            source: ReadingSource::Simulated,
        })
    }

    pub fn is_synthetic(&self) -> bool {
        self.source.is_synthetic()
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Acquisition connection state. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// First fetch (or a retry) is in progress
    #[default]
    Connecting,
    /// Last fetch from the device succeeded
    Connected,
    /// Last fetch failed after the device had been reachable
    Disconnected,
    /// Readings are synthesized locally; only an explicit retry leaves this state
    Demo,
}

impl ConnectionState {
    /// Whether the next cycle should poll the physical device.
    pub fn polls_device(self) -> bool {
        !matches!(self, ConnectionState::Demo)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Demo => write!(f, "Demo"),
        }
    }
}
