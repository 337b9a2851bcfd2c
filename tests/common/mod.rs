//! Shared fixtures for integration tests: an in-process mock probe and a
//! scripted telemetry source.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use soilsense::acquisition::{parse_analog, parse_dht, Calibration, FetchError, TelemetrySource};
use soilsense::SensorReading;

// ============================================================================
// Mock Probe
// ============================================================================

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Handles for changing what a running mock probe answers.
#[derive(Clone)]
pub struct MockProbe {
    pub addr: SocketAddr,
    dht: Arc<Mutex<Reply>>,
    analog: Arc<Mutex<Reply>>,
}

impl MockProbe {
    pub fn set_dht(&self, reply: Reply) {
        *self.dht.lock().unwrap() = reply;
    }

    pub fn set_analog(&self, reply: Reply) {
        *self.analog.lock().unwrap() = reply;
    }

    /// Address in the form the endpoint resolver accepts.
    pub fn ip(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve(reply: Reply) -> Response {
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (reply.status, reply.body).into_response()
}

/// Start a mock probe on an ephemeral localhost port.
pub async fn spawn_probe(dht: &str, analog: &str) -> MockProbe {
    let dht = Arc::new(Mutex::new(Reply::ok(dht)));
    let analog = Arc::new(Mutex::new(Reply::ok(analog)));

    let app = Router::new()
        .route(
            "/raw_dht11",
            get(|State(r): State<Arc<Mutex<Reply>>>| async move {
                let reply = r.lock().unwrap().clone();
                serve(reply).await
            }),
        )
        .with_state(Arc::clone(&dht))
        .merge(
            Router::new()
                .route(
                    "/raw_a",
                    get(|State(r): State<Arc<Mutex<Reply>>>| async move {
                        let reply = r.lock().unwrap().clone();
                        serve(reply).await
                    }),
                )
                .with_state(Arc::clone(&analog)),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockProbe { addr, dht, analog }
}

/// A localhost address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// ============================================================================
// Scripted Source
// ============================================================================

#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed with this raw analog value
    Raw(i32),
    /// Transport failure
    Fail,
    /// Payload the parser rejects
    Garbage,
    /// Block until cancelled
    Hang,
}

pub fn device_reading(raw: i32) -> SensorReading {
    SensorReading::from_device(
        &parse_dht("50 21 22").unwrap(),
        &parse_analog(&raw.to_string()).unwrap(),
        &Calibration::default(),
        Utc::now(),
    )
    .unwrap()
}

/// Plays back `steps`, then repeats `then` forever. Counts device calls.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    then: Step,
    pub calls: Arc<Mutex<usize>>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>, then: Step) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            then,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SensorReading, FetchError> {
        *self.calls.lock().unwrap() += 1;
        let step = self.steps.pop_front().unwrap_or_else(|| self.then.clone());
        match step {
            Step::Raw(raw) => Ok(device_reading(raw)),
            Step::Fail => Err(FetchError::Transport {
                url: "http://scripted/raw_dht11".into(),
                message: "connection refused".into(),
            }),
            Step::Garbage => Err(FetchError::Protocol(
                parse_dht("sensor error").expect_err("garbage must not parse"),
            )),
            Step::Hang => {
                cancel.cancelled().await;
                Err(FetchError::Cancelled)
            }
        }
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}
