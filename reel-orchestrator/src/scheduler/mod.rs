//! Scheduler layer for the orchestrator
//!
//! This layer polls the task source on a fixed interval, leases a profile
//! per task, runs the generation through the worker supervisor and
//! reconciles each completion back into the stores and the task source.

pub mod poller;
mod reconcile;
pub mod state;

pub use poller::{Scheduler, SchedulerSettings, TickOutcome};
pub use state::{ActiveWorker, SchedulerHandle, SchedulerState};
