//! Account Discord commands - balance, referral stats and leaderboards.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, author_account_id},
        core::views::Leaderboard,
        errors::Result,
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;
    use tracing::instrument;

    /// Leaderboard choices offered in the slash command.
    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum Board {
        #[name = "deposits"]
        Deposited,
        #[name = "spent"]
        Spent,
        #[name = "referrals"]
        Referrals,
        #[name = "net"]
        NetResult,
    }

    impl From<Board> for Leaderboard {
        fn from(board: Board) -> Self {
            match board {
                Board::Deposited => Self::Deposited,
                Board::Spent => Self::Spent,
                Board::Referrals => Self::Referrals,
                Board::NetResult => Self::NetResult,
            }
        }
    }

    /// Registers the author on first contact and returns their account id.
    async fn touch_account(ctx: Context<'_>) -> Result<i64> {
        let account_id = author_account_id(ctx)?;
        ctx.data()
            .ledger
            .register_account(account_id, Some(ctx.author().name.clone()), None)
            .await?;
        Ok(account_id)
    }

    /// Shows your balance, referral balance and lifetime totals.
    #[poise::command(slash_command, prefix_command)]
    #[instrument(skip(ctx))]
    pub async fn balance(ctx: Context<'_>) -> Result<()> {
        let account_id = touch_account(ctx).await?;
        let ledger = &ctx.data().ledger;
        let Some(account) = ledger.account(account_id).await? else {
            ctx.say("Account not found.").await?;
            return Ok(());
        };

        let embed = serenity::CreateEmbed::default()
            .title("💰 Balance")
            .field("Balance", format!("{:.2}", account.balance), true)
            .field("Referral balance", format!("{:.2}", account.referral_balance), true)
            .field(
                "Total",
                format!("{:.2}", account.balance + account.referral_balance),
                true,
            )
            .field("Deposited", format!("{:.2}", account.total_deposited), true)
            .field("Spent", format!("{:.2}", account.total_spent), true)
            .field("Games", account.games_played.to_string(), true)
            .color(0x0034_98DB);

        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        Ok(())
    }

    /// Shows your referral share code and how many people joined with it.
    #[poise::command(slash_command, prefix_command)]
    #[instrument(skip(ctx))]
    pub async fn referral(ctx: Context<'_>) -> Result<()> {
        let account_id = touch_account(ctx).await?;
        let ledger = &ctx.data().ledger;
        let code = ledger.writer().referral_code(account_id).await?.into_value();
        let Some(account) = ledger.account(account_id).await? else {
            ctx.say("Account not found.").await?;
            return Ok(());
        };

        let mut text = String::new();
        writeln!(&mut text, "🔗 Your referral code: `{code}`")?;
        writeln!(&mut text, "Invited: {}", account.referral_count)?;
        writeln!(&mut text, "Active: {}", account.active_referrals_count)?;
        writeln!(
            &mut text,
            "Referral balance: {:.2}",
            account.referral_balance
        )?;
        ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
            .await?;
        Ok(())
    }

    /// Shows a leaderboard.
    #[poise::command(slash_command, prefix_command)]
    #[instrument(skip(ctx))]
    pub async fn top(
        ctx: Context<'_>,
        #[description = "Which leaderboard"] board: Board,
        #[description = "How many entries (default 10, max 25)"] limit: Option<u64>,
    ) -> Result<()> {
        let board = Leaderboard::from(board);
        let entries = ctx
            .data()
            .ledger
            .leaderboard(board, limit.unwrap_or(10).clamp(1, 25))
            .await?;

        if entries.is_empty() {
            ctx.say("🏆 Nobody on this board yet.").await?;
            return Ok(());
        }

        let mut text = String::new();
        for (rank, entry) in entries.iter().enumerate() {
            let name = entry
                .username
                .clone()
                .unwrap_or_else(|| format!("#{}", entry.account_id));
            writeln!(&mut text, "{}. {name} - {:.2}", rank + 1, entry.value)?;
        }

        let embed = serenity::CreateEmbed::default()
            .title(format!("🏆 {}", board.title()))
            .description(text)
            .color(0x00F1_C40F);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
