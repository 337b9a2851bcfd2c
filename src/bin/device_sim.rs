//! Soil probe simulator
//!
//! Serves the probe's HTTP endpoints (`/raw_dht11` and `/raw_a`) with a
//! slowly drifting soil and air state, so the monitor can be run without
//! hardware. Supports both firmware wire formats, artificial latency and
//! random failures.
//!
//! # Usage
//! ```bash
//! ./device-sim --addr 127.0.0.1:8081 --format current --fail-rate 0.1
//! ./soilsense --device-ip 127.0.0.1:8081
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

use soilsense::acquisition::moisture_percent_to_raw;
use soilsense::config::defaults::{ANALOG_PATH, DHT_PATH};

/// Fixed top resistor of the probe's voltage divider (ohms)
const R_TOP_OHMS: f64 = 10_000.0;
/// Full-scale ADC reading
const ADC_MAX: f64 = 1024.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WireFormat {
    /// `humidity|temperature` and a bare ADC integer
    Legacy,
    /// `humidity temperature heat_index` and `A=.. R_top=.. R_bottom=..`
    Current,
}

#[derive(Parser, Debug)]
#[command(name = "device-sim")]
#[command(about = "Simulated soil probe for SoilSense development")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    addr: String,

    /// Firmware wire format to emit
    #[arg(short, long, value_enum, default_value = "current")]
    format: WireFormat,

    /// Delay before every response (ms)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Probability (0-1) that a request fails with HTTP 500
    #[arg(long, default_value = "0.0")]
    fail_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Simulated Probe
// ============================================================================

struct Probe {
    rng: StdRng,
    moisture_noise: Normal<f64>,
    air_noise: Normal<f64>,
    moisture_percent: f64,
    temperature_c: f64,
    humidity_percent: f64,
}

impl Probe {
    fn new(seed: Option<u64>) -> Result<Self> {
        Ok(Self {
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            moisture_noise: Normal::new(0.0, 1.5).context("moisture noise")?,
            air_noise: Normal::new(0.0, 0.2).context("air noise")?,
            moisture_percent: 55.0,
            temperature_c: 22.0,
            humidity_percent: 50.0,
        })
    }

    /// Soil slowly dries out; occasional watering brings it back up.
    fn drift(&mut self) {
        let watering = if self.moisture_percent < 20.0 && self.rng.gen_bool(0.2) {
            40.0
        } else {
            0.0
        };
        self.moisture_percent = (self.moisture_percent - 0.3
            + watering
            + self.moisture_noise.sample(&mut self.rng))
        .clamp(0.0, 100.0);
        self.temperature_c =
            (self.temperature_c + self.air_noise.sample(&mut self.rng)).clamp(5.0, 40.0);
        self.humidity_percent =
            (self.humidity_percent + 2.0 * self.air_noise.sample(&mut self.rng)).clamp(20.0, 95.0);
    }

    fn dht_payload(&mut self, format: WireFormat) -> String {
        self.drift();
        // DHT11 reports whole units.
        let h = self.humidity_percent.round();
        let t = self.temperature_c.round();
        match format {
            WireFormat::Legacy => format!("{h}|{t}"),
            WireFormat::Current => format!("{h} {t} {:.1}", heat_index(t, h)),
        }
    }

    fn analog_payload(&mut self, format: WireFormat) -> String {
        self.drift();
        let raw = moisture_percent_to_raw(self.moisture_percent);
        match format {
            WireFormat::Legacy => raw.to_string(),
            WireFormat::Current => {
                let r_bottom = R_TOP_OHMS * f64::from(raw) / (ADC_MAX - f64::from(raw)).max(1.0);
                format!("A={raw} R_top={R_TOP_OHMS:.0} R_bottom={r_bottom:.0}")
            }
        }
    }

    fn should_fail(&mut self, fail_rate: f64) -> bool {
        fail_rate > 0.0 && self.rng.gen_bool(fail_rate.min(1.0))
    }
}

/// Simplified Steadman heat index (°C), good enough for plausible values.
fn heat_index(temperature_c: f64, humidity: f64) -> f64 {
    if temperature_c < 26.0 {
        return temperature_c;
    }
    temperature_c + 0.05 * (humidity - 40.0).max(0.0)
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Clone)]
struct SimState {
    probe: Arc<Mutex<Probe>>,
    format: WireFormat,
    delay: Duration,
    fail_rate: f64,
}

impl SimState {
    async fn respond(&self, render: impl FnOnce(&mut Probe, WireFormat) -> String) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let Ok(mut probe) = self.probe.lock() else {
            return (StatusCode::INTERNAL_SERVER_ERROR, "probe state poisoned").into_response();
        };
        if probe.should_fail(self.fail_rate) {
            debug!("Injected failure");
            return (StatusCode::INTERNAL_SERVER_ERROR, "sensor read failed").into_response();
        }
        let body = render(&mut probe, self.format);
        debug!(%body, "Serving reading");
        body.into_response()
    }
}

async fn raw_dht11(State(state): State<SimState>) -> Response {
    state.respond(Probe::dht_payload).await
}

async fn raw_a(State(state): State<SimState>) -> Response {
    state.respond(Probe::analog_payload).await
}

fn app(state: SimState) -> Router {
    Router::new()
        .route(DHT_PATH, get(raw_dht11))
        .route(ANALOG_PATH, get(raw_a))
        .with_state(state)
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

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.fail_rate),
        "--fail-rate must be between 0 and 1"
    );

    let state = SimState {
        probe: Arc::new(Mutex::new(Probe::new(args.seed)?)),
        format: args.format,
        delay: Duration::from_millis(args.delay_ms),
        fail_rate: args.fail_rate,
    };

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    info!(
        addr = %args.addr,
        format = ?args.format,
        delay_ms = args.delay_ms,
        fail_rate = args.fail_rate,
        "Device simulator listening"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Device simulator shutting down");
        })
        .await
        .context("device simulator server error")
}
