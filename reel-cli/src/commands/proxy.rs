//! Proxy command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use reel_core::domain::proxy::parse_proxy_list;
use reel_orchestrator::repository::ProfileRepository;

use crate::config::Stores;

/// Proxy subcommands
#[derive(Subcommand)]
pub enum ProxyCommands {
    /// Add proxies from a file, one address per line
    Seed {
        /// Proxy list; blank lines and # comments are skipped
        file: String,
    },
    /// List all proxies and their profiles
    List,
}

pub async fn handle_proxy_command(command: ProxyCommands, stores: &Stores) -> Result<()> {
    match command {
        ProxyCommands::Seed { file } => seed_proxies(stores, &file).await,
        ProxyCommands::List => list_proxies(stores).await,
    }
}

async fn seed_proxies(stores: &Stores, file: &str) -> Result<()> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let addresses = parse_proxy_list(&contents);

    if addresses.is_empty() {
        println!("{}", format!("No proxies found in {}.", file).yellow());
        return Ok(());
    }

    let inserted = stores.profiles.seed_proxies(&addresses).await?;
    println!(
        "{} Added {} new proxies ({} already known)",
        "✓".green(),
        inserted.to_string().bold(),
        addresses.len() as u64 - inserted
    );

    Ok(())
}

async fn list_proxies(stores: &Stores) -> Result<()> {
    let proxies = stores.profiles.list_proxies().await?;

    if proxies.is_empty() {
        println!("{}", "No proxies seeded.".yellow());
        return Ok(());
    }

    let free = proxies.iter().filter(|p| p.profile_name.is_none()).count();
    println!(
        "{}",
        format!("Found {} proxies ({} unassigned):", proxies.len(), free).bold()
    );
    println!();
    for proxy in proxies {
        let owner = match &proxy.profile_name {
            Some(name) => name.cyan(),
            None => "unassigned".dimmed(),
        };
        println!(
            "  {} {}  {}  {}",
            "▸".cyan(),
            proxy.address,
            owner,
            proxy
                .added_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
    }

    Ok(())
}
