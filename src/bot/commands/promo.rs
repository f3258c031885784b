//! Promo Discord commands - redemption for players, creation for admins.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, author_account_id},
        core::promo::Activation,
        errors::Result,
    };
    use chrono::{TimeDelta, Utc};
    use tracing::{info, instrument, warn};

    /// Redeems a promo code.
    #[poise::command(slash_command, prefix_command)]
    #[instrument(skip(ctx))]
    pub async fn promo(
        ctx: Context<'_>,
        #[description = "Promo code"] code: String,
    ) -> Result<()> {
        let account_id = author_account_id(ctx)?;
        let ledger = &ctx.data().ledger;
        ledger
            .register_account(account_id, Some(ctx.author().name.clone()), None)
            .await?;

        let reply = match ledger.activate_promo(&code, account_id).await?.into_value() {
            Activation::Granted {
                reward,
                new_balance,
            } => format!("🎁 Promo activated! +{reward:.2}, balance is now {new_balance:.2}."),
            Activation::Rejected(reason) => format!("❌ Promo code {reason}."),
        };
        ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
            .await?;
        Ok(())
    }

    /// Admin: creates a promo code.
    #[poise::command(slash_command, prefix_command)]
    #[instrument(skip(ctx))]
    pub async fn newpromo(
        ctx: Context<'_>,
        #[description = "Code (case-insensitive)"] code: String,
        #[description = "Reward credited per activation"] reward: f64,
        #[description = "Maximum number of activations"] max_activations: i32,
        #[description = "Expires after this many hours"] expires_in_hours: Option<i64>,
    ) -> Result<()> {
        let admin_id = author_account_id(ctx)?;
        if !ctx.data().is_admin(admin_id) {
            warn!("Non-admin {} tried to create promo {}", admin_id, code);
            ctx.send(
                poise::CreateReply::default()
                    .content("⛔ Admins only.")
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }

        let expires_at = match expires_in_hours {
            Some(hours) => {
                let Some(ttl) = TimeDelta::try_hours(hours).filter(|d| *d > TimeDelta::zero())
                else {
                    ctx.say("❌ Expiry must be a positive number of hours.").await?;
                    return Ok(());
                };
                Some(Utc::now() + ttl)
            }
            None => None,
        };

        let created = ctx
            .data()
            .ledger
            .create_promo(&code, reward, max_activations, expires_at, admin_id)
            .await?
            .into_value();
        info!("Admin {} created promo {}", admin_id, created.code);

        let expiry = created
            .expires_at
            .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string());
        ctx.send(
            poise::CreateReply::default()
                .content(format!(
                    "✅ Promo `{}` created: {:.2} × {} activations, expires {expiry}.",
                    created.code, created.reward_amount, created.max_activations
                ))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
