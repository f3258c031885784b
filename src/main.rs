use dotenvy::dotenv;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wager_ledger::{
    Error, Ledger, Result,
    bot::{self, BotData},
    config::{admins, database, ledger::load_default_config},
};

/// Creates the directory holding a file database, if the URL names one.
fn ensure_database_dir(url: &str) -> Result<()> {
    if database::is_memory_url(url) {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .split('?')
        .next()
        .unwrap_or_default();
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Ledger configuration
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Open the ledger (migrations, writer actor, settings cache)
    let url = database::get_database_url();
    ensure_database_dir(&url)?;
    let ledger = Arc::new(
        Ledger::open(&url, config)
            .await
            .inspect(|_| info!("Ledger opened at {}", url))
            .inspect_err(|e| error!("Failed to open ledger: {}", e))?,
    );

    // 5. Run the bot until it stops or Ctrl-C arrives
    let token = std::env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;
    let data = BotData::new(Arc::clone(&ledger), admins::get_admin_ids());

    let outcome = tokio::select! {
        result = bot::run_bot(token, data) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            Ok(())
        }
    };

    // 6. Drain the writer and truncate the WAL before exiting
    match ledger.shutdown().await {
        Ok(report) => info!(
            "Final checkpoint: {} frames checkpointed",
            report.checkpointed_frames
        ),
        Err(e) => error!("Shutdown checkpoint failed: {}", e),
    }
    outcome
}
