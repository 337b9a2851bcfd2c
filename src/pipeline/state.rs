//! Connection state machine and the published telemetry snapshot.
//!
//! ## Transition table
//!
//! ```text
//! from          | FetchSucceeded | FetchFailed              | Retry / Reset
//! --------------+----------------+--------------------------+--------------
//! Connecting    | Connected      | Demo (via Disconnected)  | Connecting
//! Connected     | Connected      | Disconnected             | Connecting
//! Disconnected  | Connected      | Demo                     | Connecting
//! Demo          | Demo           | Demo                     | Connecting
//! ```
//!
//! `Demo` is sticky: no poll outcome leaves it, only an explicit retry or reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::HistorySeries;
use crate::acquisition::FailureKind;
use crate::types::{ConnectionState, SensorReading};

// ============================================================================
// State Machine
// ============================================================================

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    FetchSucceeded,
    FetchFailed,
    /// User asked to try the device again
    Retry,
    /// Subsystem reset (history cleared as well)
    Reset,
}

/// Pure transition function implementing the table above.
pub fn next_state(from: ConnectionState, event: ConnectionEvent) -> ConnectionState {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (from, event) {
        (_, E::Retry | E::Reset) => S::Connecting,
        (S::Demo, _) => S::Demo,
        (_, E::FetchSucceeded) => S::Connected,
        (S::Connected, E::FetchFailed) => S::Disconnected,
        (S::Connecting | S::Disconnected, E::FetchFailed) => S::Demo,
    }
}

/// Records one applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub event: ConnectionEvent,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True when this transition switched the pipeline into demo mode.
    pub fn entered_demo(&self) -> bool {
        self.to == ConnectionState::Demo && self.from != ConnectionState::Demo
    }
}

/// Owns the current [`ConnectionState`]. Only the scheduler holds one.
#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> Transition {
        let from = self.state;
        let to = next_state(from, event);
        self.state = to;

        if from != to {
            if from == ConnectionState::Connecting && to == ConnectionState::Demo {
                tracing::info!(
                    from = %from,
                    via = %ConnectionState::Disconnected,
                    to = %to,
                    "Connection state changed"
                );
            } else {
                tracing::info!(from = %from, to = %to, event = ?event, "Connection state changed");
            }
        }

        Transition { from, to, event }
    }
}

// ============================================================================
// Published Snapshot
// ============================================================================

/// Last failed cycle, kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Running counters for acquisition cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    /// Completed (not cancelled) cycles
    pub cycles: u64,
    pub device_readings: u64,
    pub simulated_readings: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_failure: Option<FailureReport>,
}

/// Read-only view of the acquisition pipeline, published after every cycle
/// and every applied command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub state: ConnectionState,
    /// True whenever readings are synthesized
    pub demo: bool,
    pub latest: Option<SensorReading>,
    pub history: HistorySeries,
    pub endpoint: String,
    pub poll_interval_ms: u64,
    pub stats: CycleStats,
    pub updated_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn initial(endpoint: String, poll_interval_ms: u64) -> Self {
        Self {
            state: ConnectionState::Connecting,
            demo: false,
            latest: None,
            history: HistorySeries::default(),
            endpoint,
            poll_interval_ms,
            stats: CycleStats::default(),
            updated_at: Utc::now(),
        }
    }
}
