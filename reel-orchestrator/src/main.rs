use anyhow::{Context, Result};
use reel_client::TaskSourceClient;
use reel_core::domain::proxy::parse_proxy_list;
use reel_orchestrator::api::{self, ApiState};
use reel_orchestrator::config::Config;
use reel_orchestrator::db::Database;
use reel_orchestrator::repository::{
    PgProfileRepository, PgTaskRepository, ProfileRepository, ProfileScope,
};
use reel_orchestrator::scheduler::{Scheduler, SchedulerSettings};
use reel_orchestrator::service::{ExecutorSettings, WorkerSupervisor, notifier};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reel_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Reel Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;
    let instance_id = uuid::Uuid::new_v4().to_string();
    info!(
        "Loaded configuration: machine_id={}, product_code={}, instance={}",
        config.machine_id, config.product_code, instance_id
    );

    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate()
        .await
        .context("Failed to run database migrations")?;

    let scope = ProfileScope {
        machine_id: config.machine_id.clone(),
        min_credit: config.min_credit,
        profiles_dir: config.profiles_dir.clone(),
    };
    let profiles = Arc::new(PgProfileRepository::new(db.pool().clone(), scope));
    let tasks = Arc::new(PgTaskRepository::new(db.pool().clone()));

    if let Err(e) = bootstrap_profiles(&config, profiles.as_ref()).await {
        db.close().await;
        return Err(e);
    }

    let source = Arc::new(TaskSourceClient::new(
        config.task_api_url.clone(),
        config.task_api_key.clone(),
    ));
    let launcher = Arc::new(WorkerSupervisor::new(ExecutorSettings::from_config(&config)));
    let notifier = notifier::from_webhook_url(config.notify_webhook_url.as_deref());

    let scheduler = Scheduler::new(
        SchedulerSettings::from_config(&config, instance_id)?,
        profiles,
        tasks.clone(),
        source,
        launcher,
        notifier,
    );

    if let Some(addr) = &config.status_bind_addr {
        let app = api::create_router(ApiState {
            scheduler: scheduler.handle(),
            tasks,
            machine_id: config.machine_id.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status API to {}", addr))?;
        info!("Status API listening on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Status API stopped: {}", e);
            }
        });
    }

    let result = scheduler.run(shutdown_signal()).await;

    db.close().await;
    info!("Reel Orchestrator stopped");
    result
}

/// Seeds the proxy file and makes sure every configured profile exists.
///
/// Exhausted proxies or a profile owned by another machine are fatal.
async fn bootstrap_profiles(config: &Config, profiles: &dyn ProfileRepository) -> Result<()> {
    if let Some(path) = &config.proxy_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read proxy file {}", path))?;
        let addresses = parse_proxy_list(&contents);
        let inserted = profiles
            .seed_proxies(&addresses)
            .await
            .context("Failed to seed proxies")?;
        info!(
            "Seeded {} new proxies ({} listed in {})",
            inserted,
            addresses.len(),
            path
        );
    }

    for name in &config.profiles {
        match profiles.ensure_profile(name).await {
            Ok(profile) => info!("Profile {} ready on proxy {}", profile.name, profile.proxy),
            Err(e) if e.is_configuration_error() => {
                return Err(anyhow::anyhow!("Cannot set up profile {}: {}", name, e));
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to ensure profile {}", name)),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
