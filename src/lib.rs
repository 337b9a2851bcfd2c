//! SoilSense: soil-moisture telemetry acquisition
//!
//! Polls a Wi-Fi soil probe (ESP8266 with a DHT11 and an analog moisture
//! sensor) over HTTP, calibrates raw readings, keeps rolling history, and
//! falls back to clearly flagged simulated data when the device cannot be
//! reached.
//!
//! ## Architecture
//!
//! - **acquisition**: endpoint resolution, HTTP fetcher, wire parsing, calibration, demo simulator
//! - **pipeline**: scheduler task, connection state machine, history buffers
//! - **config**: TOML config, persisted device settings, settings watcher
//! - **api**: read API over the published telemetry snapshot

pub mod acquisition;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod types;

pub use config::{DeviceSettings, MonitorConfig};

pub use types::{ConnectionState, ReadingSource, SensorReading};

pub use acquisition::{
    Calibration, DemoSimulator, EndpointResolver, FailureKind, FetchError, TelemetryFetcher,
    TelemetrySource,
};

pub use pipeline::{
    AcquisitionScheduler, ScheduledTask, SchedulerHandle, SchedulerOptions, TelemetrySnapshot,
};
