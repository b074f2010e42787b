#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod discord;
mod marriage;
mod utils;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = Config::load_from_file(&args.config)?;
    utils::logging::init_tracing(&config.logging);
    info!("discord-waifu starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!("storage backend ready: {:?}", db_manager.backend());
    let sweeper =
        db_manager.spawn_sweeper(Duration::from_secs(config.database.sweep_interval_secs));

    let discord_client = discord::DiscordClient::new(&config.bot);
    let service = Arc::new(marriage::MarriageService::new(
        &config,
        db_manager.store(),
        discord_client.api(),
        discord_client.api(),
    ));
    discord_client.set_service(service.clone()).await;

    tokio::select! {
        result = discord_client.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before discord login completed");
            service.shutdown();
            sweeper.abort();
            return Ok(());
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
    }

    info!("discord-waifu shutting down");
    service.shutdown();
    discord_client.stop().await?;
    sweeper.abort();
    Ok(())
}
