//! Bot layer - Discord interface to the ledger
//!
//! Commands never touch rows directly; everything goes through [`Ledger`].

/// Discord command implementations (general, account, promo)
pub mod commands;

use crate::{
    errors::{Error, Result},
    ledger::Ledger,
};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
#[derive(Debug)]
pub struct BotData {
    /// The open ledger
    pub ledger: Arc<Ledger>,
    /// Chat user ids allowed to run admin commands
    pub admins: HashSet<i64>,
}

impl BotData {
    /// Creates a new `BotData` from an open ledger and the admin set.
    #[must_use]
    pub const fn new(ledger: Arc<Ledger>, admins: HashSet<i64>) -> Self {
        Self { ledger, admins }
    }

    /// Whether `user_id` may run admin commands
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }
}

/// Poise context used by every command
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Chat user id of the invoking author as a ledger account id.
pub fn author_account_id(ctx: Context<'_>) -> Result<i64> {
    Ok(i64::try_from(ctx.author().id.get())?)
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
            let message = if error.is_retryable() {
                "The ledger is busy right now, please try again in a moment.".to_string()
            } else {
                format!("An error occurred: {error}")
            };
            if let Err(e) = ctx.say(message).await {
                error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Runs the Discord client until it stops.
#[instrument(skip(token, data))]
pub async fn run_bot(token: String, data: BotData) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::balance(),
                commands::referral(),
                commands::top(),
                commands::promo(),
                commands::newpromo(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Commands registered globally");
                Ok(data)
            })
        })
        .build();

    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Starting bot client...");
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;
    client.start().await?;
    Ok(())
}
