//! Persisted device settings
//!
//! The two values an operator changes at runtime (device address and poll
//! interval) live in their own small TOML file so the settings API can write
//! it and the watcher can pick up edits made by hand.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use super::defaults::{DEFAULT_DEVICE_IP, DEFAULT_POLL_INTERVAL_MS, POLL_INTERVAL_PRESETS_MS};
use crate::acquisition::endpoint::base_url_for;
use crate::acquisition::EndpointError;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("poll interval {0} ms is not one of {presets:?}", presets = POLL_INTERVAL_PRESETS_MS)]
    InvalidInterval(u64),

    #[error("invalid device address: {0}")]
    InvalidAddress(#[from] EndpointError),

    #[error("settings I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings parse error ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("settings serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Poll intervals are restricted to the preset list.
pub fn validate_poll_interval(interval_ms: u64) -> Result<u64, SettingsError> {
    if POLL_INTERVAL_PRESETS_MS.contains(&interval_ms) {
        Ok(interval_ms)
    } else {
        Err(SettingsError::InvalidInterval(interval_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub device_ip: String,
    pub poll_interval_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_ip: DEFAULT_DEVICE_IP.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Partial update as accepted by the settings API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub device_ip: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

/// One field that differs between two settings values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsChange {
    DeviceIp { old: String, new: String },
    PollInterval { old: u64, new: u64 },
}

impl std::fmt::Display for SettingsChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceIp { old, new } => write!(f, "device_ip: {old} -> {new}"),
            Self::PollInterval { old, new } => write!(f, "poll_interval_ms: {old} -> {new}"),
        }
    }
}

impl DeviceSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        base_url_for(&self.device_ip)?;
        validate_poll_interval(self.poll_interval_ms)?;
        Ok(())
    }

    /// Apply a partial update, validating the result. `self` is untouched on error.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<Self, SettingsError> {
        let next = Self {
            device_ip: update
                .device_ip
                .as_deref()
                .map_or_else(|| self.device_ip.clone(), |ip| ip.trim().to_string()),
            poll_interval_ms: update.poll_interval_ms.unwrap_or(self.poll_interval_ms),
        };
        next.validate()?;
        Ok(next)
    }

    pub fn diff(&self, newer: &Self) -> Vec<SettingsChange> {
        let mut changes = Vec::new();
        if self.device_ip != newer.device_ip {
            changes.push(SettingsChange::DeviceIp {
                old: self.device_ip.clone(),
                new: newer.device_ip.clone(),
            });
        }
        if self.poll_interval_ms != newer.poll_interval_ms {
            changes.push(SettingsChange::PollInterval {
                old: self.poll_interval_ms,
                new: newer.poll_interval_ms,
            });
        }
        changes
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when it exists, otherwise `None`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, SettingsError> {
        if path.exists() {
            Self::load_from_file(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            device_ip = %self.device_ip,
            poll_interval_ms = self.poll_interval_ms,
            "Device settings saved"
        );
        Ok(())
    }
}

// ============================================================================
// Shared Store
// ============================================================================

/// Current device settings plus their backing file.
///
/// Shared by the settings API (writes) and the file watcher (reloads) so a
/// change saved by one is not replayed by the other.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: Mutex<DeviceSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf, initial: DeviceSettings) -> Self {
        Self {
            path,
            current: Mutex::new(initial),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn current(&self) -> DeviceSettings {
        self.current.lock().await.clone()
    }

    /// Validate and persist a partial update, returning the new settings and
    /// what changed. Nothing is written when validation fails.
    pub async fn update(
        &self,
        update: &SettingsUpdate,
    ) -> Result<(DeviceSettings, Vec<SettingsChange>), SettingsError> {
        let mut current = self.current.lock().await;
        let next = current.apply(update)?;
        let changes = current.diff(&next);
        if !changes.is_empty() {
            next.save_to_file(&self.path)?;
            *current = next.clone();
        }
        Ok((next, changes))
    }

    /// Re-read the backing file. Returns the fields that differ from the
    /// settings held before the call.
    ///
    /// The file is read under the lock so a concurrent `update` is never
    /// overwritten with what was on disk before it saved.
    pub async fn reload(&self) -> Result<Vec<SettingsChange>, SettingsError> {
        let mut current = self.current.lock().await;
        let loaded = DeviceSettings::load_from_file(&self.path)?;
        let changes = current.diff(&loaded);
        *current = loaded;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_accepted() {
        for ms in POLL_INTERVAL_PRESETS_MS {
            assert_eq!(validate_poll_interval(ms).unwrap(), ms);
        }
        assert!(matches!(
            validate_poll_interval(0),
            Err(SettingsError::InvalidInterval(0))
        ));
        assert!(validate_poll_interval(4999).is_err());
    }

    #[test]
    fn test_apply_partial_update() {
        let base = DeviceSettings::default();
        let next = base
            .apply(&SettingsUpdate {
                device_ip: Some(" 10.0.0.7 ".into()),
                poll_interval_ms: None,
            })
            .unwrap();
        assert_eq!(next.device_ip, "10.0.0.7");
        assert_eq!(next.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let base = DeviceSettings::default();
        assert!(base
            .apply(&SettingsUpdate {
                device_ip: Some(String::new()),
                poll_interval_ms: None,
            })
            .is_err());
        assert!(base
            .apply(&SettingsUpdate {
                device_ip: None,
                poll_interval_ms: Some(7),
            })
            .is_err());
    }

    #[test]
    fn test_diff_lists_changed_fields() {
        let a = DeviceSettings::default();
        let b = DeviceSettings {
            device_ip: "10.0.0.9".into(),
            poll_interval_ms: 2000,
        };
        let changes = a.diff(&b);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].to_string(), "poll_interval_ms: 5000 -> 2000");
        assert!(a.diff(&a).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        assert!(DeviceSettings::load_optional(&path).unwrap().is_none());

        let settings = DeviceSettings {
            device_ip: "192.168.1.50".into(),
            poll_interval_ms: 30_000,
        };
        settings.save_to_file(&path).unwrap();
        assert_eq!(DeviceSettings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_rejects_invalid_interval_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.toml");
        std::fs::write(&path, "device_ip = \"10.0.0.1\"\npoll_interval_ms = 1234\n").unwrap();
        assert!(matches!(
            DeviceSettings::load_from_file(&path),
            Err(SettingsError::InvalidInterval(1234))
        ));
    }

    #[tokio::test]
    async fn test_store_update_persists_and_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        let store = SettingsStore::new(path.clone(), DeviceSettings::default());

        let (next, changes) = store
            .update(&SettingsUpdate {
                device_ip: None,
                poll_interval_ms: Some(2000),
            })
            .await
            .unwrap();
        assert_eq!(next.poll_interval_ms, 2000);
        assert_eq!(changes, vec![SettingsChange::PollInterval { old: 5000, new: 2000 }]);
        assert_eq!(DeviceSettings::load_from_file(&path).unwrap(), next);

        // The file now matches memory, so a reload sees nothing new.
        assert!(store.reload().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_rejects_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        let store = SettingsStore::new(path.clone(), DeviceSettings::default());
        let result = store
            .update(&SettingsUpdate {
                device_ip: Some("   ".into()),
                poll_interval_ms: None,
            })
            .await;
        assert!(matches!(result, Err(SettingsError::InvalidAddress(_))));
        assert!(!path.exists());
        assert_eq!(store.current().await, DeviceSettings::default());
    }

    #[test]
    fn test_store_reload_picks_up_hand_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        let store = SettingsStore::new(path.clone(), DeviceSettings::default());
        std::fs::write(&path, "device_ip = \"10.0.0.42\"\npoll_interval_ms = 5000\n").unwrap();

        let changes = tokio_test::block_on(store.reload()).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], SettingsChange::DeviceIp { new, .. } if new == "10.0.0.42"));
        assert_eq!(tokio_test::block_on(store.current()).device_ip, "10.0.0.42");
    }

    #[tokio::test]
    async fn test_reload_waits_for_in_flight_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        DeviceSettings::default().save_to_file(&path).unwrap();
        let store = std::sync::Arc::new(SettingsStore::new(path.clone(), DeviceSettings::default()));

        // Stand in for an update that holds the lock while it saves.
        let mut guard = store.current.lock().await;
        let reload = tokio::spawn({
            let store = std::sync::Arc::clone(&store);
            async move { store.reload().await }
        });
        tokio::task::yield_now().await;

        let updated = DeviceSettings {
            device_ip: "10.0.0.77".into(),
            poll_interval_ms: 2000,
        };
        updated.save_to_file(&path).unwrap();
        *guard = updated.clone();
        drop(guard);

        let changes = reload.await.unwrap().unwrap();
        assert!(changes.is_empty(), "{changes:?}");
        assert_eq!(store.current().await, updated);
    }

    #[test]
    fn test_store_unchanged_update_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_settings.toml");
        let store = SettingsStore::new(path.clone(), DeviceSettings::default());

        let (_, changes) = tokio_test::block_on(store.update(&SettingsUpdate {
            device_ip: Some(DEFAULT_DEVICE_IP.into()),
            poll_interval_ms: None,
        }))
        .unwrap();
        assert!(changes.is_empty());
        assert!(!path.exists());
    }
}
