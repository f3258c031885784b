//! General Discord commands - ping and help.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::Context,
        errors::Result,
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        let help_text = "**Help**\n\
        • `/balance` - Shows your balance, referral balance and totals.\n\
        • `/referral` - Shows your share code and referral stats.\n\
        • `/top <board> [limit]` - Leaderboards by deposits, spend, referrals or net result.\n\
        • `/promo <code>` - Redeems a promo code.\n\
        • `/ping` - Checks if the bot is responsive.\n\n\
        **Admin**\n\
        • `/newpromo <code> <reward> <max_activations> [expires_in_hours]` - Creates a promo code.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
