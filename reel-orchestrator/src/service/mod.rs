//! Service Module
//!
//! Collaborators the scheduler drives, each behind a trait so tests can
//! substitute them.

pub mod notifier;
pub mod supervisor;
pub mod task_source;

pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use supervisor::{ExecutorSettings, GenerationRequest, WorkerLauncher, WorkerSupervisor};
pub use task_source::TaskSource;
