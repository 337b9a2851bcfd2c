//! SoilSense - soil-moisture telemetry monitor
//!
//! Polls the soil probe, publishes calibrated readings and history over a
//! small HTTP API, and switches to flagged demo data when the probe is
//! unreachable.
//!
//! # Usage
//!
//! ```bash
//! # Poll the probe on its default access-point address
//! cargo run --release
//!
//! # Poll a local simulator every second
//! cargo run --bin device-sim -- --addr 127.0.0.1:8081 &
//! cargo run --release -- --device-ip 127.0.0.1:8081 --interval-ms 1000
//! ```
//!
//! # Environment Variables
//!
//! - `SOILSENSE_CONFIG`: path to the TOML config (default: `./soilsense.toml`)
//! - `SOILSENSE_CORS_ORIGINS`: comma-separated origins allowed to call the API
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use soilsense::api::{create_app, ApiState};
use soilsense::config::settings::SettingsStore;
use soilsense::config::watcher::run_settings_watcher;
use soilsense::config::{
    ConfigSource, DeviceSettings, MonitorConfig, RuntimeOverrides, StartupConfig,
};
use soilsense::pipeline::{ScheduledTask, SchedulerOptions};
use soilsense::{AcquisitionScheduler, DemoSimulator, EndpointResolver, TelemetryFetcher};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "soilsense")]
#[command(about = "Soil-moisture telemetry monitor with demo fallback")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides SOILSENSE_CONFIG and ./soilsense.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Device address, e.g. 192.168.4.1 or http://probe.local
    #[arg(long, value_name = "IP")]
    device_ip: Option<String>,

    /// Poll interval in milliseconds (1000, 2000, 5000, 10000, 30000 or 60000)
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Override the API listen address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Seed the demo simulator for a reproducible walk
    #[arg(long, value_name = "N")]
    demo_seed: Option<u64>,

    /// Run acquisition only, without the HTTP API
    #[arg(long)]
    no_api: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Acquisition,
    SettingsWatcher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Acquisition => write!(f, "Acquisition"),
            TaskName::SettingsWatcher => write!(f, "SettingsWatcher"),
        }
    }
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await
            .context("HTTP server error")?;
        info!("[HttpServer] Graceful shutdown complete");
        Ok(TaskName::HttpServer)
    });
}

fn spawn_acquisition(task_set: &mut JoinSet<Result<TaskName>>, task: ScheduledTask) {
    task_set.spawn(async move {
        info!("[Acquisition] Task starting");
        task.join().await;
        Ok(TaskName::Acquisition)
    });
}

/// Wait for shutdown or the first task failure, then let remaining tasks drain.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => match result {
                Some(Ok(Ok(task_name))) => {
                    info!("Supervisor: task {task_name} completed");
                }
                Some(Ok(Err(e))) => {
                    error!(error = %e, "Supervisor: task failed");
                    cancel_token.cancel();
                    outcome = Err(e);
                    break;
                }
                Some(Err(e)) => {
                    error!(error = %e, "Supervisor: task panicked");
                    cancel_token.cancel();
                    outcome = Err(anyhow::anyhow!("task panicked: {e}"));
                    break;
                }
                None => break,
            }
        }
    }

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("Supervisor: task {task_name} stopped"),
            Ok(Err(e)) => warn!(error = %e, "Supervisor: task ended with error during shutdown"),
            Err(e) => warn!(error = %e, "Supervisor: task panicked during shutdown"),
        }
    }

    outcome
}

// ============================================================================
// Startup
// ============================================================================

impl CliArgs {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            device_ip: self.device_ip.clone(),
            interval_ms: self.interval_ms,
            server_addr: self.addr.clone(),
            demo_seed: self.demo_seed,
        }
    }
}

/// Config file, then persisted device settings, then CLI flags.
fn resolve_config(args: &CliArgs) -> Result<StartupConfig> {
    let (config, source) = match &args.config {
        Some(path) => {
            let config = MonitorConfig::load_from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            (config, ConfigSource::File(path.clone()))
        }
        None => MonitorConfig::load(),
    };
    info!(source = %source, "Configuration loaded");

    let persisted = match DeviceSettings::load_optional(&config.settings.path) {
        Ok(Some(settings)) => {
            info!(
                path = %config.settings.path.display(),
                device_ip = %settings.device_ip,
                poll_interval_ms = settings.poll_interval_ms,
                "Applying persisted device settings"
            );
            Some(settings)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable device settings file");
            None
        }
    };

    config
        .into_startup(persisted.as_ref(), &args.overrides())
        .context("invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let StartupConfig {
        config,
        settings: startup_settings,
    } = resolve_config(&args)?;

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let endpoint = EndpointResolver::new(&config.device.ip).context("invalid device address")?;
    let fetcher = TelemetryFetcher::with_timeout(
        endpoint.reader(),
        config.calibration,
        config.device.request_timeout(),
    )
    .context("building HTTP client")?;
    let simulator = DemoSimulator::new(config.calibration, config.demo.seed);

    info!(
        endpoint = %endpoint.get_endpoint(),
        interval_ms = config.polling.interval_ms,
        timeout_ms = config.device.request_timeout_ms,
        raw_dry = config.calibration.raw_dry,
        raw_wet = config.calibration.raw_wet,
        "Starting SoilSense acquisition"
    );

    let scheduler =
        AcquisitionScheduler::new(fetcher, simulator, endpoint, SchedulerOptions::from(&config))
            .with_cancel_token(&cancel_token);
    let task = scheduler.spawn();
    let handle = task.handle().clone();

    // Seeded without CLI overrides so they are never persisted.
    let settings = Arc::new(SettingsStore::new(
        config.settings.path.clone(),
        startup_settings,
    ));

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_acquisition(&mut task_set, task);

    {
        let settings = Arc::clone(&settings);
        let handle = handle.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            run_settings_watcher(settings, handle, cancel).await;
            Ok(TaskName::SettingsWatcher)
        });
    }

    if args.no_api {
        info!("HTTP API disabled (--no-api)");
    } else {
        let listener = tokio::net::TcpListener::bind(&config.server.addr)
            .await
            .with_context(|| format!("binding {}", config.server.addr))?;
        info!(addr = %config.server.addr, "HTTP API listening");
        let app = create_app(ApiState::new(handle, settings));
        spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    }

    run_supervisor(&mut task_set, cancel_token).await?;
    info!("SoilSense shutdown complete");
    Ok(())
}
