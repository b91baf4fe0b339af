//! Profile command handlers
//!
//! Handles profile creation, listing and the manual overrides operators
//! need: credit corrections, blocking and daily count resets.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use reel_core::domain::profile::{Profile, ProfileStatus};
use reel_orchestrator::repository::ProfileRepository;

use crate::config::Stores;

/// Profile subcommands
#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Create a profile on the oldest free proxy, or show the existing one
    Ensure {
        name: String,
    },
    /// List profiles of this machine
    List,
    /// Record a credit reading
    Credit {
        name: String,
        remaining: i32,
    },
    /// Set the status (active, blocked, low_credit, disabled)
    Status {
        name: String,
        status: ProfileStatus,
    },
    /// Zero the daily run counts
    ResetDaily,
}

pub async fn handle_profile_command(command: ProfileCommands, stores: &Stores) -> Result<()> {
    let profiles = &stores.profiles;

    match command {
        ProfileCommands::Ensure { name } => {
            let profile = profiles.ensure_profile(&name).await?;
            println!("{} Profile {} ready", "✓".green(), profile.name.bold());
            println!();
            print_profile_details(&profile);
        }
        ProfileCommands::List => list_profiles(stores).await?,
        ProfileCommands::Credit { name, remaining } => {
            profiles.update_credit(&name, remaining).await?;
            if let Some(profile) = profiles.get_profile(&name).await? {
                println!(
                    "{} {} has {} credit ({})",
                    "✓".green(),
                    name.bold(),
                    remaining,
                    colorize_status(&profile.status)
                );
            }
        }
        ProfileCommands::Status { name, status } => {
            profiles.set_status(&name, status).await?;
            println!(
                "{} {} is now {}",
                "✓".green(),
                name.bold(),
                colorize_status(&status)
            );
        }
        ProfileCommands::ResetDaily => {
            let count = profiles.reset_daily_counts().await?;
            println!("{} Reset run counts of {} profile(s)", "✓".green(), count);
        }
    }

    Ok(())
}

async fn list_profiles(stores: &Stores) -> Result<()> {
    let profiles = stores.profiles.list_profiles().await?;

    if profiles.is_empty() {
        println!("{}", "No profiles on this machine.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} profile(s):", profiles.len()).bold());
    println!();
    for profile in profiles {
        print_profile_summary(&profile);
    }

    Ok(())
}

fn print_profile_summary(profile: &Profile) {
    println!("  {} Profile {}", "▸".cyan(), profile.name.bold());
    println!("    Status:    {}", colorize_status(&profile.status));
    println!("    Credit:    {}", format_credit(profile.credit_remaining));
    println!("    Runs:      {}", profile.daily_run_count);
    if let Some(last_run) = profile.last_run_at {
        println!(
            "    Last Run:  {}",
            last_run.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if profile.is_leased(chrono::Utc::now()) {
        if let Some(holder) = &profile.lease_holder {
            println!("    Leased by: {}", holder.yellow());
        }
    }
    println!();
}

fn print_profile_details(profile: &Profile) {
    println!("{}", "Profile Details:".bold());
    println!("  Name:        {}", profile.name.cyan());
    println!("  Machine:     {}", profile.machine_id);
    println!("  Proxy:       {}", profile.proxy);
    println!("  Session Dir: {}", profile.session_dir.dimmed());
    println!("  Status:      {}", colorize_status(&profile.status));
    println!("  Credit:      {}", format_credit(profile.credit_remaining));
    println!(
        "  Fingerprint: {}",
        profile.fingerprint.as_deref().unwrap_or("-").dimmed()
    );
    println!(
        "  Created:     {}",
        profile.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn format_credit(credit: Option<i32>) -> String {
    credit.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Colorize profile status for display
fn colorize_status(status: &ProfileStatus) -> colored::ColoredString {
    let status_str = status.as_str();
    match status {
        ProfileStatus::Active => status_str.green(),
        ProfileStatus::LowCredit => status_str.yellow(),
        ProfileStatus::Blocked => status_str.red(),
        ProfileStatus::Disabled => status_str.dimmed(),
    }
}
