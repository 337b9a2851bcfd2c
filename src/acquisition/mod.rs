//! Sensor data acquisition module
//!
//! Everything between the device's HTTP endpoints and a calibrated
//! [`SensorReading`](crate::types::SensorReading): address resolution, the
//! HTTP fetcher, wire-format parsing, calibration, and the demo simulator
//! used when the device cannot be reached.

pub mod calibration;
pub mod demo;
pub mod endpoint;
pub mod fetcher;
pub mod mapper;
pub mod protocol;

pub use calibration::{moisture_percent_to_raw, raw_to_moisture_percent, Calibration, CalibrationError};
pub use demo::DemoSimulator;
pub use endpoint::{EndpointError, EndpointReader, EndpointResolver};
pub use fetcher::{FailureKind, FetchError, TelemetryFetcher, TelemetrySource};
pub use mapper::{map_value, try_map_value, MapError};
pub use protocol::{parse_analog, parse_dht, AnalogPayload, DhtPayload, ProtocolError};
