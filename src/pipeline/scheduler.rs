//! Acquisition scheduler
//!
//! Owns the polling loop, the connection state machine, the latest reading
//! and the history buffers. It runs as a single task: cycles never overlap,
//! commands are applied only between cycles, and every state change is
//! published through a `watch` channel that readers cannot write to.
//!
//! ```text
//! start ──► cycle ──► wait(interval | command | cancel) ──► cycle ──► ...
//!            │
//!            ├─ Connecting/Connected/Disconnected: fetch from device
//!            └─ Demo: next simulated reading
//! ```

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::history::MetricHistory;
use super::state::{ConnectionEvent, ConnectionMachine, CycleStats, FailureReport, TelemetrySnapshot};
use crate::acquisition::endpoint::base_url_for;
use crate::acquisition::{DemoSimulator, EndpointError, EndpointReader, EndpointResolver, FailureKind, FetchError, TelemetrySource};
use crate::config::defaults::{
    COMMAND_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL_MS, DEMO_SEED_BATCH, HISTORY_CAPACITY,
};
use crate::config::settings::{validate_poll_interval, SettingsError};
use crate::config::MonitorConfig;
use crate::types::{ConnectionState, SensorReading};

// ============================================================================
// Options, Commands, Errors
// ============================================================================

/// Tunables for one scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    pub moisture_capacity: usize,
    pub temperature_capacity: usize,
    pub humidity_capacity: usize,
    /// Simulated points written into empty history on entering demo mode
    pub demo_seed_batch: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            moisture_capacity: HISTORY_CAPACITY,
            temperature_capacity: HISTORY_CAPACITY,
            humidity_capacity: HISTORY_CAPACITY,
            demo_seed_batch: DEMO_SEED_BATCH,
        }
    }
}

impl From<&MonitorConfig> for SchedulerOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.polling.interval_ms),
            moisture_capacity: config.history.moisture_capacity,
            temperature_capacity: config.history.temperature_capacity,
            humidity_capacity: config.history.humidity_capacity,
            demo_seed_batch: config.demo.seed_batch,
        }
    }
}

/// Requests applied by the scheduler between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Leave whatever state we are in and try the device again now
    Retry,
    /// Clear history and the latest reading, then reconnect
    Reset,
    /// Run a cycle now instead of waiting for the timer
    RefreshNow,
    SetDeviceIp(String),
    SetPollInterval(u64),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("acquisition scheduler is not running")]
    Stopped,
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Device reading recorded
    Device(SensorReading),
    /// Simulated reading(s) recorded; `entered_demo` on the failing cycle that switched modes
    Simulated { count: usize, entered_demo: bool },
    /// Device cycle failed; nothing recorded
    Failed { kind: FailureKind },
    /// Simulator could not produce a reading; update skipped
    Skipped,
    /// Shutdown interrupted the cycle; nothing written
    Cancelled,
}

// ============================================================================
// Handle
// ============================================================================

/// Clone-able control and observation handle for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    snapshot: watch::Receiver<TelemetrySnapshot>,
    endpoint: EndpointReader,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    async fn send(&self, command: SchedulerCommand) -> Result<(), SchedulerError> {
        self.commands.send(command).await.map_err(|_| SchedulerError::Stopped)
    }

    pub async fn retry(&self) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::Retry).await
    }

    pub async fn reset(&self) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::Reset).await
    }

    pub async fn refresh_now(&self) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::RefreshNow).await
    }

    /// Validate and queue a device address change. Applies on the next poll.
    pub async fn set_device_ip(&self, ip: &str) -> Result<(), SchedulerError> {
        base_url_for(ip)?;
        self.send(SchedulerCommand::SetDeviceIp(ip.trim().to_string())).await
    }

    /// Validate and queue a poll interval change. Applies from the next scheduled tick.
    pub async fn set_poll_interval(&self, interval_ms: u64) -> Result<(), SchedulerError> {
        validate_poll_interval(interval_ms)?;
        self.send(SchedulerCommand::SetPollInterval(interval_ms)).await
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.get_endpoint()
    }

    /// Request shutdown without waiting for the task to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Running scheduler task. Dropping it cancels the task.
pub struct ScheduledTask {
    handle: SchedulerHandle,
    join: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Cancel the timer and any in-flight request, then wait for the task to exit.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.join().await;
    }

    /// Wait for the task to exit on its own (its cancel token fired).
    pub async fn join(mut self) {
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "Acquisition task ended abnormally");
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct AcquisitionScheduler<S: TelemetrySource> {
    source: S,
    simulator: DemoSimulator,
    endpoint: EndpointResolver,
    machine: ConnectionMachine,
    history: MetricHistory,
    latest: Option<SensorReading>,
    poll_interval: Duration,
    demo_seed_batch: usize,
    stats: CycleStats,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    snapshot_rx: watch::Receiver<TelemetrySnapshot>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    cancel: CancellationToken,
}

impl<S: TelemetrySource> AcquisitionScheduler<S> {
    pub fn new(
        source: S,
        simulator: DemoSimulator,
        endpoint: EndpointResolver,
        options: SchedulerOptions,
    ) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(TelemetrySnapshot::initial(
            endpoint.get_endpoint(),
            duration_ms(options.poll_interval),
        ));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        Self {
            source,
            simulator,
            endpoint,
            machine: ConnectionMachine::new(),
            history: MetricHistory::with_capacities(
                options.moisture_capacity,
                options.temperature_capacity,
                options.humidity_capacity,
            ),
            latest: None,
            poll_interval: options.poll_interval,
            demo_seed_batch: options.demo_seed_batch.max(1),
            stats: CycleStats::default(),
            snapshot_tx,
            snapshot_rx,
            command_tx,
            command_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the scheduler's lifetime to an outer token (e.g. process shutdown).
    pub fn with_cancel_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            commands: self.command_tx.clone(),
            snapshot: self.snapshot_rx.clone(),
            endpoint: self.endpoint.reader(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Spawn the polling loop onto the current runtime.
    pub fn spawn(self) -> ScheduledTask {
        let handle = self.handle();
        let join = tokio::spawn(self.run());
        ScheduledTask {
            handle,
            join: Some(join),
        }
    }

    /// Polling loop. Returns once the cancel token fires.
    pub async fn run(mut self) {
        info!(
            source = self.source.source_name(),
            endpoint = %self.endpoint.get_endpoint(),
            interval_ms = duration_ms(self.poll_interval),
            "Acquisition scheduler started"
        );
        self.publish();

        'polling: loop {
            if let CycleOutcome::Cancelled = self.run_cycle().await {
                break;
            }

            // The interval is read once per wait, so changes apply from the next tick.
            let sleep = tokio::time::sleep(self.poll_interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break 'polling,
                    () = &mut sleep => break,
                    Some(command) = self.command_rx.recv() => {
                        if self.apply_command(command) {
                            break;
                        }
                    }
                }
            }
        }

        info!(cycles = self.stats.cycles, "Acquisition scheduler stopped");
    }

    /// Apply a command. Returns true when a cycle should run immediately.
    pub fn apply_command(&mut self, command: SchedulerCommand) -> bool {
        debug!(?command, "Applying scheduler command");
        let run_now = match command {
            SchedulerCommand::Retry => {
                self.machine.apply(ConnectionEvent::Retry);
                info!("Retrying device connection");
                true
            }
            SchedulerCommand::Reset => {
                self.machine.apply(ConnectionEvent::Reset);
                self.history.clear();
                self.latest = None;
                self.simulator.reset();
                self.stats = CycleStats::default();
                info!("Acquisition state reset");
                true
            }
            SchedulerCommand::RefreshNow => true,
            SchedulerCommand::SetDeviceIp(ip) => {
                match self.endpoint.set_endpoint(&ip) {
                    Ok(url) => info!(endpoint = %url, "Device endpoint updated"),
                    Err(e) => warn!(error = %e, ip = %ip, "Rejected device address"),
                }
                false
            }
            SchedulerCommand::SetPollInterval(ms) => {
                self.poll_interval = Duration::from_millis(ms);
                info!(interval_ms = ms, "Poll interval updated");
                false
            }
        };
        self.publish();
        run_now
    }

    /// Apply every queued command without waiting. Returns true when any of
    /// them asked for an immediate cycle.
    pub fn apply_pending_commands(&mut self) -> bool {
        let mut run_now = false;
        while let Ok(command) = self.command_rx.try_recv() {
            run_now |= self.apply_command(command);
        }
        run_now
    }

    /// Run exactly one acquisition cycle and publish the result.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }

        let outcome = if self.machine.state().polls_device() {
            let result = self.source.fetch_reading(&self.cancel).await;
            // A result that lands after shutdown was requested is dropped.
            if self.cancel.is_cancelled() {
                return CycleOutcome::Cancelled;
            }
            match result {
                Ok(reading) => self.on_device_reading(reading),
                Err(FetchError::Cancelled) => return CycleOutcome::Cancelled,
                Err(e) => self.on_fetch_failure(&e),
            }
        } else {
            self.on_demo_tick()
        };

        self.stats.cycles += 1;
        self.publish();
        outcome
    }

    fn on_device_reading(&mut self, reading: SensorReading) -> CycleOutcome {
        self.machine.apply(ConnectionEvent::FetchSucceeded);
        self.stats.device_readings += 1;
        self.stats.consecutive_failures = 0;
        self.record(reading.clone());
        CycleOutcome::Device(reading)
    }

    fn on_fetch_failure(&mut self, error: &FetchError) -> CycleOutcome {
        let kind = error.kind().unwrap_or(FailureKind::Network);
        self.stats.failures += 1;
        self.stats.consecutive_failures += 1;
        self.stats.last_failure = Some(FailureReport {
            kind,
            message: error.to_string(),
            at: Utc::now(),
        });
        warn!(
            kind = %kind,
            error = %error,
            consecutive = self.stats.consecutive_failures,
            "Acquisition cycle failed"
        );

        let transition = self.machine.apply(ConnectionEvent::FetchFailed);
        if !transition.entered_demo() {
            return CycleOutcome::Failed { kind };
        }

        warn!(
            endpoint = %self.endpoint.get_endpoint(),
            "Device unreachable, switching to demo mode (readings are simulated until retry)"
        );
        let count = if self.history.is_empty() {
            self.demo_seed_batch
        } else {
            1
        };
        match self.simulator.batch(count) {
            Ok(readings) => {
                for reading in readings {
                    self.stats.simulated_readings += 1;
                    self.record(reading);
                }
                CycleOutcome::Simulated {
                    count,
                    entered_demo: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "Demo simulator failed, skipping update");
                CycleOutcome::Skipped
            }
        }
    }

    fn on_demo_tick(&mut self) -> CycleOutcome {
        match self.simulator.next_reading() {
            Ok(reading) => {
                self.stats.simulated_readings += 1;
                self.record(reading);
                CycleOutcome::Simulated {
                    count: 1,
                    entered_demo: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Demo simulator failed, skipping update");
                CycleOutcome::Skipped
            }
        }
    }

    fn record(&mut self, reading: SensorReading) {
        self.history.record(&reading);
        self.latest = Some(reading);
    }

    fn publish(&self) {
        let state = self.machine.state();
        self.snapshot_tx.send_replace(TelemetrySnapshot {
            state,
            demo: state == ConnectionState::Demo,
            latest: self.latest.clone(),
            history: self.history.series(),
            endpoint: self.endpoint.get_endpoint(),
            poll_interval_ms: duration_ms(self.poll_interval),
            stats: self.stats.clone(),
            updated_at: Utc::now(),
        });
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
