//! Acquisition Pipeline Module
//!
//! ## Cycle Flow
//!
//! ```text
//! timer / command
//!       │
//!       ▼
//! AcquisitionScheduler ──► TelemetrySource (device)   ──┐
//!       │             └──► DemoSimulator (demo mode)  ──┤
//!       │                                                ▼
//!       │                               latest reading + MetricHistory
//!       ▼
//! ConnectionMachine ──► TelemetrySnapshot (watch) ──► API / subscribers
//! ```
//!
//! The scheduler task is the only writer. Everything else observes the
//! published snapshot or sends commands through a [`SchedulerHandle`].

pub mod history;
pub mod scheduler;
mod state;

pub use history::{HistoryBuffer, HistorySeries, MetricHistory};
pub use scheduler::{
    AcquisitionScheduler, CycleOutcome, ScheduledTask, SchedulerCommand, SchedulerError,
    SchedulerHandle, SchedulerOptions,
};
pub use state::*;
