//! Polling-based device settings watcher.
//!
//! Checks the settings file's mtime every 2 seconds. When a change is
//! detected it debounces for 500ms (editors often write in stages), reloads
//! the file and forwards any changed values to the acquisition scheduler.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use super::settings::{SettingsChange, SettingsStore};
use crate::pipeline::SchedulerHandle;

/// Interval between mtime checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Debounce delay after detecting a change.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Run the settings watcher until `cancel` fires or the scheduler stops.
pub async fn run_settings_watcher(
    store: Arc<SettingsStore>,
    scheduler: SchedulerHandle,
    cancel: CancellationToken,
) {
    let path = store.path().to_path_buf();
    tracing::info!(path = %path.display(), "Settings watcher started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let Some(current_mtime) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Settings file not accessible, keeping current settings"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current_mtime) {
            continue;
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(DEBOUNCE_DELAY) => {}
        }
        if get_mtime(&path) != Some(current_mtime) {
            // Still being written; pick it up next poll.
            continue;
        }
        last_mtime = Some(current_mtime);

        let changes = match store.reload().await {
            Ok(changes) => changes,
            Err(e) => {
                tracing::error!(error = %e, "Settings reload failed, keeping previous settings");
                continue;
            }
        };
        if changes.is_empty() {
            tracing::debug!("Settings file touched without changes");
            continue;
        }

        if let Err(e) = forward_changes(&scheduler, &changes).await {
            tracing::debug!(error = %e, "Scheduler stopped, settings watcher exiting");
            break;
        }
    }

    tracing::info!("Settings watcher stopped");
}

/// Send each change to the scheduler as a command.
pub async fn forward_changes(
    scheduler: &SchedulerHandle,
    changes: &[SettingsChange],
) -> Result<(), crate::pipeline::SchedulerError> {
    for change in changes {
        tracing::info!(%change, "Device settings changed");
        match change {
            SettingsChange::DeviceIp { new, .. } => scheduler.set_device_ip(new).await?,
            SettingsChange::PollInterval { new, .. } => scheduler.set_poll_interval(*new).await?,
        }
    }
    Ok(())
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
