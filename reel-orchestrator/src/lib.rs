//! Reel Orchestrator
//!
//! Claims video generation tasks from the task API and runs each one through
//! the generation executor on a leased browser profile.
//!
//! Architecture:
//! - Configuration: settings from the environment
//! - Repositories: Postgres stores for profiles, proxies, tasks and stats
//! - Services: executor supervision, task source access, notifications
//! - Scheduler: the concurrency-bounded polling loop and its reconciliation
//! - API: optional read-only status endpoints

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod service;
