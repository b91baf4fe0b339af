//! Core domain types
//!
//! These types are shared between the orchestrator (which persists and
//! schedules them) and the operator CLI (which inspects them).

pub mod profile;
pub mod proxy;
pub mod stats;
pub mod task;
pub mod worker;
