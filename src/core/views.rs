//! Read-only aggregations. These never go through the writer.

use crate::{
    entities::{Account, AccountColumn, account},
    errors::Result,
};
use sea_orm::sea_query::Expr;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};

/// Leaderboard ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaderboard {
    /// Largest `total_deposited`
    Deposited,
    /// Largest `total_spent`
    Spent,
    /// Most referred accounts that made a qualifying deposit
    Referrals,
    /// Largest `total_deposited - total_spent`
    NetResult,
}

impl Leaderboard {
    /// Label for chat output
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Deposited => "Top depositors",
            Self::Spent => "Top spenders",
            Self::Referrals => "Top referrers",
            Self::NetResult => "Top winners",
        }
    }

    fn value(self, account: &account::Model) -> f64 {
        match self {
            Self::Deposited => account.total_deposited,
            Self::Spent => account.total_spent,
            #[allow(clippy::cast_precision_loss)]
            Self::Referrals => account.active_referrals_count as f64,
            Self::NetResult => account.total_deposited - account.total_spent,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    /// Account id
    pub account_id: i64,
    /// Last known display name
    pub username: Option<String>,
    /// Ranked value
    pub value: f64,
}

/// Top `limit` accounts for `board`, best first.
pub async fn leaderboard<C>(db: &C, board: Leaderboard, limit: u64) -> Result<Vec<LeaderboardEntry>>
where
    C: ConnectionTrait,
{
    let query = Account::find();
    let query = match board {
        Leaderboard::Deposited => query.order_by_desc(AccountColumn::TotalDeposited),
        Leaderboard::Spent => query.order_by_desc(AccountColumn::TotalSpent),
        Leaderboard::Referrals => query.order_by_desc(AccountColumn::ActiveReferralsCount),
        Leaderboard::NetResult => query.order_by_desc(
            Expr::col(AccountColumn::TotalDeposited).sub(Expr::col(AccountColumn::TotalSpent)),
        ),
    };

    let accounts = query
        .order_by_asc(AccountColumn::Id)
        .limit(limit)
        .all(db)
        .await?;

    Ok(accounts
        .into_iter()
        .map(|account| LeaderboardEntry {
            value: board.value(&account),
            account_id: account.id,
            username: account.username,
        })
        .collect())
}

/// Sum of spendable balances across all accounts.
pub async fn total_liabilities<C>(db: &C) -> Result<f64>
where
    C: ConnectionTrait,
{
    let accounts = Account::find().all(db).await?;
    Ok(accounts
        .iter()
        .map(|a| a.balance + a.referral_balance)
        .sum())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::account::{adjust_balance, register_account};
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_leaderboards() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, Some("low".to_string()), None).await?;
        register_account(&db, 2, Some("high".to_string()), None).await?;
        adjust_balance(&db, 1, 5.0).await?;
        adjust_balance(&db, 2, 20.0).await?;
        adjust_balance(&db, 2, -18.0).await?;

        let deposited = leaderboard(&db, Leaderboard::Deposited, 10).await?;
        assert_eq!(deposited[0].account_id, 2);
        assert_eq!(deposited[0].value, 20.0);

        let spent = leaderboard(&db, Leaderboard::Spent, 1).await?;
        assert_eq!(spent.len(), 1);
        assert_eq!(spent[0].username.as_deref(), Some("high"));

        // 5 - 0 beats 20 - 18
        let net = leaderboard(&db, Leaderboard::NetResult, 10).await?;
        assert_eq!(net[0].account_id, 1);
        assert_eq!(net[1].value, 2.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_referral_board_and_liabilities() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        register_account(&db, 2, None, None).await?;
        adjust_balance(&db, 1, 3.0).await?;
        adjust_balance(&db, 2, 4.5).await?;

        let referrals = leaderboard(&db, Leaderboard::Referrals, 10).await?;
        assert_eq!(referrals.len(), 2);
        assert!(referrals.iter().all(|e| e.value == 0.0));

        assert_eq!(total_liabilities(&db).await?, 7.5);
        Ok(())
    }
}
