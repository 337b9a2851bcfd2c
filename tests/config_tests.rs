//! Config loading, validation and device settings persistence.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use soilsense::acquisition::{Calibration, DemoSimulator, EndpointResolver, TelemetryFetcher};
use soilsense::config::settings::SettingsStore;
use soilsense::config::validation::validate_unknown_keys;
use soilsense::config::watcher::run_settings_watcher;
use soilsense::config::{
    ConfigError, ConfigSource, DeviceSettings, MonitorConfig, RuntimeOverrides, SettingsUpdate,
    CONFIG_ENV_VAR,
};
use soilsense::pipeline::{AcquisitionScheduler, SchedulerOptions};
use tokio_util::sync::CancellationToken;

const FULL_CONFIG: &str = r#"
[device]
ip = "10.0.0.20"
request_timeout_ms = 2500

[polling]
interval_ms = 2000

[history]
moisture_capacity = 50
temperature_capacity = 30
humidity_capacity = 30

[calibration]
raw_dry = 1023
raw_wet = 300

[demo]
seed = 99
seed_batch = 12

[server]
addr = "127.0.0.1:9090"

[settings]
path = "/tmp/soilsense-settings.toml"
"#;

#[test]
fn full_config_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("soilsense.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = MonitorConfig::load_from_file(&path).unwrap();
    assert_eq!(config.device.ip, "10.0.0.20");
    assert_eq!(config.device.request_timeout(), Duration::from_millis(2500));
    assert_eq!(config.polling.interval_ms, 2000);
    assert_eq!(config.history.moisture_capacity, 50);
    assert_eq!(config.calibration, Calibration::dashboard());
    assert_eq!(config.demo.seed, Some(99));
    assert_eq!(config.demo.seed_batch, 12);
    assert_eq!(config.server.addr, "127.0.0.1:9090");

    let options = SchedulerOptions::from(&config);
    assert_eq!(options.poll_interval, Duration::from_secs(2));
    assert_eq!(options.demo_seed_batch, 12);
    assert!(validate_unknown_keys(FULL_CONFIG).is_empty());
}

#[test]
fn env_var_takes_precedence_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[polling]\ninterval_ms = 30000\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let (config, source) = MonitorConfig::load();
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(source, ConfigSource::File(path));
    assert_eq!(config.polling.interval_ms, 30_000);
}

#[test]
fn parse_errors_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[device\nip = 1").unwrap();

    let err = MonitorConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(ref p, _) if p == &path), "{err:?}");
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn invalid_values_are_rejected_with_every_reason() {
    let err = MonitorConfig::from_toml_str(
        "[polling]\ninterval_ms = 3000\n\n[calibration]\nraw_dry = 400\nraw_wet = 400\n",
    )
    .unwrap_err();
    let ConfigError::Validation(errors) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(err.to_string().contains("polling.interval_ms"));
}

#[test]
fn typos_warn_but_still_load() {
    let config = MonitorConfig::from_toml_str("[device]\nipp = \"10.0.0.1\"\n").unwrap();
    assert_eq!(config.device.ip, "192.168.4.1");

    let warnings = validate_unknown_keys("[device]\nipp = \"10.0.0.1\"\n");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("device.ip"));
}

#[test]
fn missing_settings_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device_settings.toml");
    assert_eq!(DeviceSettings::load_optional(&path).unwrap(), None);
}

#[tokio::test]
async fn command_line_address_is_not_persisted_by_settings_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device_settings.toml");
    DeviceSettings {
        device_ip: "10.0.0.1".into(),
        poll_interval_ms: 5000,
    }
    .save_to_file(&path)
    .unwrap();

    let persisted = DeviceSettings::load_optional(&path).unwrap();
    let overrides = RuntimeOverrides {
        device_ip: Some("127.0.0.1:8081".into()),
        ..RuntimeOverrides::default()
    };
    let startup = MonitorConfig::default()
        .into_startup(persisted.as_ref(), &overrides)
        .unwrap();
    assert_eq!(startup.config.device.ip, "127.0.0.1:8081");

    let store = SettingsStore::new(path.clone(), startup.settings);
    let (_, changes) = store
        .update(&SettingsUpdate {
            device_ip: None,
            poll_interval_ms: Some(2000),
        })
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);

    let saved = DeviceSettings::load_from_file(&path).unwrap();
    assert_eq!(saved.device_ip, "10.0.0.1");
    assert_eq!(saved.poll_interval_ms, 2000);
}

#[tokio::test(start_paused = true)]
async fn watcher_forwards_hand_edits_to_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device_settings.toml");
    let initial = DeviceSettings::default();
    initial.save_to_file(&path).unwrap();

    let endpoint = EndpointResolver::default();
    let fetcher = TelemetryFetcher::new(endpoint.reader(), Calibration::default()).unwrap();
    let mut scheduler = AcquisitionScheduler::new(
        fetcher,
        DemoSimulator::new(Calibration::default(), Some(1)),
        endpoint,
        SchedulerOptions::default(),
    );
    let handle = scheduler.handle();

    let store = Arc::new(SettingsStore::new(path.clone(), initial));
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(run_settings_watcher(
        Arc::clone(&store),
        handle.clone(),
        cancel.clone(),
    ));
    // Let the watcher record the starting mtime.
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(&path, "device_ip = \"10.1.2.3\"\npoll_interval_ms = 1000\n").unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
    drop(file);

    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    watcher.await.unwrap();

    assert_eq!(store.current().await.device_ip, "10.1.2.3");
    assert!(!scheduler.apply_pending_commands());
    assert_eq!(scheduler.poll_interval(), Duration::from_secs(1));
    assert_eq!(handle.endpoint(), "http://10.1.2.3");
}
