//! Task command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use reel_core::domain::task::{Task, TaskStatus};
use reel_orchestrator::repository::TaskRepository;

use crate::config::Stores;

/// Task subcommands
#[derive(Subcommand)]
pub enum TaskCommands {
    /// Show a task record
    Show {
        /// External task id
        id: String,
    },
}

pub async fn handle_task_command(command: TaskCommands, stores: &Stores) -> Result<()> {
    match command {
        TaskCommands::Show { id } => match stores.tasks.get_task(&id).await? {
            Some(task) => print_task_details(&task),
            None => anyhow::bail!("Task {} not found", id),
        },
    }

    Ok(())
}

/// Print detailed task information
fn print_task_details(task: &Task) {
    println!("{}", "Task Details:".bold());
    println!("  ID:          {}", task.task_id.cyan());
    println!("  Product:     {}", task.product_code);
    println!("  Status:      {}", colorize_status(&task.status));
    println!("  Prompt:      {}", task.prompt);

    for url in &task.image_urls {
        println!("  Image:       {}", url.dimmed());
    }
    if let Some(profile) = &task.profile_name {
        println!("  Profile:     {}", profile);
    }

    if let Some(claimed) = task.claimed_at {
        println!("  Claimed:     {}", claimed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(started) = task.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = task.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = task.started_at {
            let seconds = completed.signed_duration_since(started).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }

    if let Some(url) = &task.result_url {
        println!("\n{}", "Result:".bold());
        println!("  {}", url.green());
    }

    if let Some(error) = &task.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Colorize task status for display
fn colorize_status(status: &TaskStatus) -> colored::ColoredString {
    let status_str = status.as_str();
    match status {
        TaskStatus::Pending | TaskStatus::Claimed => status_str.yellow(),
        TaskStatus::Processing => status_str.cyan(),
        TaskStatus::Completed => status_str.green(),
        TaskStatus::Failed | TaskStatus::Timeout => status_str.red(),
    }
}
