//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod profile;
mod proxy;
mod stats;
mod task;

pub use profile::ProfileCommands;
pub use proxy::ProxyCommands;
pub use task::TaskCommands;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Proxy pool management
    Proxy {
        #[command(subcommand)]
        command: ProxyCommands,
    },
    /// Profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Task records
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show daily statistics
    Stats {
        /// Day to show (YYYY-MM-DD), today by default
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Handle a CLI command
///
/// Opens the stores, routes the command to its handler module and closes
/// the stores again whatever the outcome.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let stores = config.connect().await?;

    let result = match command {
        Commands::Proxy { command } => proxy::handle_proxy_command(command, &stores).await,
        Commands::Profile { command } => profile::handle_profile_command(command, &stores).await,
        Commands::Task { command } => task::handle_task_command(command, &stores).await,
        Commands::Stats { date } => stats::show_stats(&stores, date).await,
    };

    stores.db.close().await;
    result
}
