//! Monitor configuration
//!
//! All tunables for one monitor instance, loaded from TOML. Every section is
//! optional and falls back to the values in [`super::defaults`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::{
    DEFAULT_DEVICE_IP, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SERVER_ADDR, DEFAULT_SETTINGS_PATH,
    DEMO_SEED_BATCH, FETCH_TIMEOUT_MS, HISTORY_CAPACITY, MAX_HISTORY_CAPACITY,
};
use super::settings::{validate_poll_interval, DeviceSettings};
use crate::acquisition::endpoint::base_url_for;
use crate::acquisition::Calibration;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "SOILSENSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "soilsense.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Per-series retention
    #[serde(default)]
    pub history: HistoryConfig,

    /// Raw → moisture curve
    #[serde(default)]
    pub calibration: Calibration,

    #[serde(default)]
    pub demo: DemoConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Where runtime-editable device settings are persisted
    #[serde(default)]
    pub settings: SettingsFileConfig,
}

/// Where a loaded config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SOILSENSE_CONFIG` environment variable
    /// 2. `./soilsense.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> (Self, ConfigSource) {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {CONFIG_ENV_VAR}");
                        return (config, ConfigSource::File(p));
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{LOCAL_CONFIG_FILE}");
                    return (config, ConfigSource::File(local));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        (Self::default(), ConfigSource::Defaults)
    }

    /// Load from a specific TOML file. Unknown keys are logged, not rejected.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate config text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check every section, collecting all problems before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = base_url_for(&self.device.ip) {
            errors.push(format!("device.ip: {e}"));
        }
        if self.device.request_timeout_ms == 0 {
            errors.push("device.request_timeout_ms must be > 0".to_string());
        }
        if let Err(e) = validate_poll_interval(self.polling.interval_ms) {
            errors.push(format!("polling.interval_ms: {e}"));
        }

        for (name, cap) in [
            ("moisture_capacity", self.history.moisture_capacity),
            ("temperature_capacity", self.history.temperature_capacity),
            ("humidity_capacity", self.history.humidity_capacity),
        ] {
            if cap == 0 || cap > MAX_HISTORY_CAPACITY {
                errors.push(format!(
                    "history.{name} = {cap} must be between 1 and {MAX_HISTORY_CAPACITY}"
                ));
            }
        }

        let cal = &self.calibration;
        if !cal.raw_dry.is_finite() || !cal.raw_wet.is_finite() {
            errors.push(format!(
                "calibration: values must be finite (got raw_dry={}, raw_wet={})",
                cal.raw_dry, cal.raw_wet
            ));
        } else if (cal.raw_dry - cal.raw_wet).abs() < f64::EPSILON {
            errors.push(format!(
                "calibration: raw_dry and raw_wet must differ (both {})",
                cal.raw_dry
            ));
        }

        let min_cap = self.history.min_capacity();
        if self.demo.seed_batch == 0 || self.demo.seed_batch > min_cap {
            errors.push(format!(
                "demo.seed_batch = {} must be between 1 and the smallest history capacity ({min_cap})",
                self.demo.seed_batch
            ));
        }

        if let Err(e) = self.server.addr.parse::<SocketAddr>() {
            errors.push(format!("server.addr '{}': {e}", self.server.addr));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Persisted device settings override the file's device address and interval.
    pub fn apply_settings(&mut self, settings: &DeviceSettings) {
        self.device.ip.clone_from(&settings.device_ip);
        self.polling.interval_ms = settings.poll_interval_ms;
    }

    /// The device settings implied by this config.
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            device_ip: self.device.ip.clone(),
            poll_interval_ms: self.polling.interval_ms,
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(ip) = &overrides.device_ip {
            self.device.ip.clone_from(ip);
        }
        if let Some(ms) = overrides.interval_ms {
            self.polling.interval_ms = ms;
        }
        if let Some(addr) = &overrides.server_addr {
            self.server.addr.clone_from(addr);
        }
        if let Some(seed) = overrides.demo_seed {
            self.demo.seed = Some(seed);
        }
    }

    /// Layer persisted device settings, then runtime overrides, and validate.
    ///
    /// The returned `settings` are taken before the overrides are applied, so
    /// seeding the settings store with them keeps command-line values out of
    /// the settings file.
    pub fn into_startup(
        mut self,
        persisted: Option<&DeviceSettings>,
        overrides: &RuntimeOverrides,
    ) -> Result<StartupConfig, ConfigError> {
        if let Some(settings) = persisted {
            self.apply_settings(settings);
        }
        let settings = self.device_settings();
        self.apply_overrides(overrides);
        self.validate()?;
        Ok(StartupConfig {
            config: self,
            settings,
        })
    }
}

/// Values given on the command line. They apply to the current run only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub device_ip: Option<String>,
    pub interval_ms: Option<u64>,
    pub server_addr: Option<String>,
    pub demo_seed: Option<u64>,
}

/// Effective runtime config plus the device settings the store starts from.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub config: MonitorConfig,
    pub settings: DeviceSettings,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address (bare IP, host or `http://` URL)
    pub ip: String,
    /// Timeout applied to each endpoint request
    pub request_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_DEVICE_IP.to_string(),
            request_timeout_ms: FETCH_TIMEOUT_MS,
        }
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub moisture_capacity: usize,
    pub temperature_capacity: usize,
    pub humidity_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            moisture_capacity: HISTORY_CAPACITY,
            temperature_capacity: HISTORY_CAPACITY,
            humidity_capacity: HISTORY_CAPACITY,
        }
    }
}

impl HistoryConfig {
    pub fn min_capacity(&self) -> usize {
        self.moisture_capacity
            .min(self.temperature_capacity)
            .min(self.humidity_capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Fixed seed for a reproducible demo walk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub seed_batch: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: None,
            seed_batch: DEMO_SEED_BATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFileConfig {
    pub path: PathBuf,
}

impl Default for SettingsFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SETTINGS_PATH),
        }
    }
}
