//! Monitor Configuration Module
//!
//! Configuration loaded from TOML files, plus the small device settings file
//! that can be changed while the monitor runs.
//!
//! ## Loading Order
//!
//! 1. `SOILSENSE_CONFIG` environment variable (path to TOML file)
//! 2. `soilsense.toml` in the current working directory
//! 3. Built-in defaults from [`defaults`]
//!
//! Persisted device settings (`[settings].path`) are applied on top of the
//! loaded config at startup and watched for edits afterwards.

pub mod defaults;
mod monitor_config;
pub mod settings;
pub mod validation;
pub mod watcher;

pub use monitor_config::*;
pub use settings::{DeviceSettings, SettingsChange, SettingsError, SettingsStore, SettingsUpdate};
pub use validation::ValidationWarning;
