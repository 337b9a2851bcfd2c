//! System-wide default constants.
//!
//! Centralises magic numbers used across acquisition, scheduling and the API.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Device
// ============================================================================

/// Address of the ESP8266 when it runs as its own access point.
pub const DEFAULT_DEVICE_IP: &str = "192.168.4.1";

/// Per-request timeout for each device endpoint (ms).
pub const FETCH_TIMEOUT_MS: u64 = 5_000;

/// Path of the temperature/humidity endpoint.
pub const DHT_PATH: &str = "/raw_dht11";

/// Path of the analog moisture endpoint.
pub const ANALOG_PATH: &str = "/raw_a";

// ============================================================================
// Polling
// ============================================================================

/// Default interval between acquisition cycles (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Poll intervals a user may choose from (ms).
pub const POLL_INTERVAL_PRESETS_MS: [u64; 6] = [1_000, 2_000, 5_000, 10_000, 30_000, 60_000];

// ============================================================================
// History
// ============================================================================

/// Default retention per chart series (samples).
pub const HISTORY_CAPACITY: usize = 20;

/// Upper bound accepted for a configured history capacity.
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

// ============================================================================
// Calibration
// ============================================================================

/// Raw ADC value reported for completely dry soil.
pub const RAW_DRY: f64 = 0.0;

/// Raw ADC value reported for saturated soil.
pub const RAW_WET: f64 = 1024.0;

/// Upper end of the legacy percent → raw reverse mapping.
pub const REVERSE_RAW_MAX: f64 = 850.0;

// ============================================================================
// Demo Simulator
// ============================================================================

/// Number of simulated points used to seed empty history on entering demo mode.
pub const DEMO_SEED_BATCH: usize = 10;

pub const DEMO_MOISTURE_RANGE: (f64, f64) = (5.0, 95.0);
pub const DEMO_MOISTURE_STEP: f64 = 5.0;
pub const DEMO_TEMPERATURE_RANGE: (f64, f64) = (18.0, 32.0);
pub const DEMO_TEMPERATURE_STEP: f64 = 1.0;
pub const DEMO_HUMIDITY_RANGE: (f64, f64) = (30.0, 90.0);
pub const DEMO_HUMIDITY_STEP: f64 = 2.0;

/// Humidity above which the demo heat index runs warmer than air temperature.
pub const DEMO_HEAT_INDEX_HUMIDITY: f64 = 40.0;

/// Heat index offset applied above `DEMO_HEAT_INDEX_HUMIDITY` (°C).
pub const DEMO_HEAT_INDEX_OFFSET: f64 = 2.0;

// ============================================================================
// Server / Settings
// ============================================================================

pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

/// File holding the user-editable device settings.
pub const DEFAULT_SETTINGS_PATH: &str = "device_settings.toml";

/// Capacity of the scheduler command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;
