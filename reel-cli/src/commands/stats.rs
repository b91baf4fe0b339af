//! Daily statistics command

use anyhow::Result;
use chrono::NaiveDate;
use colored::*;
use reel_core::domain::stats::{DailyStats, today};
use reel_orchestrator::repository::TaskRepository;

use crate::config::Stores;

pub async fn show_stats(stores: &Stores, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(today);
    let stats = stores
        .tasks
        .get_daily_stats(date)
        .await?
        .unwrap_or_else(|| DailyStats::empty(date));

    println!("{}", format!("Statistics for {}:", stats.date).bold());
    println!("  Tasks:     {}", stats.total_tasks);
    println!("  Completed: {}", stats.completed_tasks.to_string().green());
    println!("  Failed:    {}", stats.failed_tasks.to_string().red());
    println!("  Videos:    {}", stats.total_videos);

    Ok(())
}
