mod chat;
mod cli;
mod clock;
mod config;
mod db;
mod dispatcher;
mod error;
mod format;
mod lexicon;
mod models;
mod notifier;
mod parse;
mod service;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::SqlitePool;
use tracing::info;

use crate::chat::HttpChatService;
use crate::cli::{Cli, Commands};
use crate::config::{Config, load_config, validate_config};
use crate::lexicon::Catalog;
use crate::models::ReminderRequest;
use crate::service::ReminderService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config_path = %cli.config.display(), "config loaded");

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Some(Commands::Validate) => {
            println!("Configuration is valid.");
        }
        Some(Commands::Schedule { team, user, payload }) => {
            let (service, pool) = build_service(config).await?;
            let ack = service
                .schedule_reminder(&ReminderRequest {
                    team_id: team,
                    user_id: user,
                    payload,
                })
                .await?;
            println!("{ack}");
            pool.close().await;
        }
        Some(Commands::List { user }) => {
            let (service, pool) = build_service(config).await?;
            println!("{}", service.list_reminders(&user).await?);
            pool.close().await;
        }
        Some(Commands::Clear { user }) => {
            let (service, pool) = build_service(config).await?;
            println!("{}", service.delete_reminders(&user).await?);
            pool.close().await;
        }
        None => {
            daemon(config).await?;
        }
    }

    Ok(())
}

async fn build_service(config: Config) -> Result<(ReminderService, SqlitePool)> {
    let config = Arc::new(config);
    let pool = db::create_pool(&config).await.context("creating database")?;
    let catalog = Arc::new(Catalog::builtin(&config.service.default_locale).context("loading locale catalog")?);
    let chat = Arc::new(HttpChatService::new(&config.chat.base_url, &config.chat.token));
    Ok((ReminderService::new(pool.clone(), chat, catalog, config), pool))
}

async fn daemon(config: Config) -> Result<()> {
    let (service, pool) = build_service(config).await?;

    service.init().await.context("bot bootstrap failed")?;
    service.start().context("starting dispatcher")?;
    info!("reminder daemon running");

    wait_for_shutdown().await;
    info!("shutdown signal received");

    service.stop().await;
    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
