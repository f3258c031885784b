//! Account business logic - registration and balance mutation.
//!
//! Every balance change is a single guarded `UPDATE`:
//! `balance = ROUND(balance + delta, 2) WHERE id = ? AND ROUND(balance + delta, 2) >= 0`.
//! Monetary columns are kept rounded to cents so that binary float drift
//! never accumulates across movements.
//! The store evaluates the arithmetic, so no value read earlier by the
//! caller is ever written back. When the guard matches nothing the account
//! is re-read to tell a missing account apart from insufficient funds.

use crate::{
    entities::{Account, AccountColumn, account},
    errors::{Error, Result},
};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::debug;

/// Whether a balance movement counts toward the deposit and spend totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Positive deltas add to `total_deposited`, negative ones to `total_spent`.
    Counted,
    /// Promo rewards, withdrawal reservations and refunds.
    Uncounted,
}

/// Outcome of [`register_account`].
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// The account after registration
    pub account: account::Model,
    /// The account did not exist before this call
    pub created: bool,
    /// This call attached the referrer
    pub referrer_attached: bool,
}

/// Rounds a monetary expression to cents in the store.
pub(crate) fn money(expr: SimpleExpr) -> SimpleExpr {
    Expr::cust_with_exprs("ROUND(?, 2)", [expr])
}

/// `ROUND(column + amount, 2)`
pub(crate) fn plus(column: AccountColumn, amount: f64) -> SimpleExpr {
    money(Expr::col(column).add(amount))
}

/// Rejects NaN and infinite deltas.
pub fn validate_delta(delta: f64) -> Result<()> {
    if delta.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidAmount { amount: delta })
    }
}

/// Rejects amounts that are not finite and strictly positive.
pub fn validate_positive(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidAmount { amount })
    }
}

/// Retrieves an account by id.
pub async fn get_account<C>(db: &C, account_id: i64) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find_by_id(account_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves an account by id, failing if it does not exist.
pub async fn require_account<C>(db: &C, account_id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    get_account(db, account_id)
        .await?
        .ok_or(Error::AccountNotFound { account_id })
}

/// Creates the account on first contact, or refreshes its username.
///
/// A referrer is attached only when it exists, differs from the account and
/// the account has none yet. Attaching bumps the referrer's `referral_count`.
pub async fn register_account(
    db: &DatabaseConnection,
    account_id: i64,
    username: Option<String>,
    referrer_id: Option<i64>,
) -> Result<Registration> {
    let txn = db.begin().await?;

    let created = match get_account(&txn, account_id).await? {
        Some(existing) => {
            if username.is_some() && existing.username != username {
                Account::update_many()
                    .col_expr(AccountColumn::Username, Expr::value(username.clone()))
                    .filter(AccountColumn::Id.eq(account_id))
                    .exec(&txn)
                    .await?;
            }
            false
        }
        None => {
            account::ActiveModel {
                id: Set(account_id),
                username: Set(username),
                balance: Set(0.0),
                referral_balance: Set(0.0),
                total_deposited: Set(0.0),
                total_spent: Set(0.0),
                games_played: Set(0),
                referral_count: Set(0),
                active_referrals_count: Set(0),
                referrer_id: Set(None),
                referral_bonus_given: Set(false),
                created_at: Set(chrono::Utc::now()),
            }
            .insert(&txn)
            .await?;
            true
        }
    };

    let referrer_attached = match referrer_id {
        Some(referrer) if referrer != account_id => {
            attach_referrer(&txn, account_id, referrer).await?
        }
        _ => false,
    };

    let account = require_account(&txn, account_id).await?;
    txn.commit().await?;

    if created {
        debug!("Registered account {}", account_id);
    }

    Ok(Registration {
        account,
        created,
        referrer_attached,
    })
}

async fn attach_referrer<C>(db: &C, account_id: i64, referrer_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    if get_account(db, referrer_id).await?.is_none() {
        return Ok(false);
    }

    // Set-once: only an unset link may be written
    let result = Account::update_many()
        .col_expr(AccountColumn::ReferrerId, Expr::value(referrer_id))
        .filter(AccountColumn::Id.eq(account_id))
        .filter(AccountColumn::ReferrerId.is_null())
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }

    Account::update_many()
        .col_expr(
            AccountColumn::ReferralCount,
            Expr::col(AccountColumn::ReferralCount).add(1),
        )
        .filter(AccountColumn::Id.eq(referrer_id))
        .exec(db)
        .await?;
    Ok(true)
}

/// Applies `delta` to `balance` inside the caller's unit of work.
///
/// Returns the new balance. A zero delta still verifies the account.
pub async fn apply_balance_delta<C>(
    db: &C,
    account_id: i64,
    delta: f64,
    movement: Movement,
) -> Result<f64>
where
    C: ConnectionTrait,
{
    validate_delta(delta)?;
    if delta == 0.0 {
        return Ok(require_account(db, account_id).await?.balance);
    }

    let mut update = Account::update_many()
        .col_expr(AccountColumn::Balance, plus(AccountColumn::Balance, delta));
    if movement == Movement::Counted {
        update = if delta > 0.0 {
            update.col_expr(
                AccountColumn::TotalDeposited,
                plus(AccountColumn::TotalDeposited, delta),
            )
        } else {
            update.col_expr(
                AccountColumn::TotalSpent,
                plus(AccountColumn::TotalSpent, -delta),
            )
        };
    }

    let result = update
        .filter(AccountColumn::Id.eq(account_id))
        .filter(Expr::expr(plus(AccountColumn::Balance, delta)).gte(0.0))
        .exec(db)
        .await?;

    let account = require_account(db, account_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::InsufficientFunds {
            current: account.balance,
            required: -delta,
        });
    }
    Ok(account.balance)
}

/// Applies `delta` to `referral_balance` inside the caller's unit of work.
pub async fn apply_referral_delta<C>(db: &C, account_id: i64, delta: f64) -> Result<f64>
where
    C: ConnectionTrait,
{
    validate_delta(delta)?;
    if delta == 0.0 {
        return Ok(require_account(db, account_id).await?.referral_balance);
    }

    let result = Account::update_many()
        .col_expr(
            AccountColumn::ReferralBalance,
            plus(AccountColumn::ReferralBalance, delta),
        )
        .filter(AccountColumn::Id.eq(account_id))
        .filter(Expr::expr(plus(AccountColumn::ReferralBalance, delta)).gte(0.0))
        .exec(db)
        .await?;

    let account = require_account(db, account_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::InsufficientFunds {
            current: account.referral_balance,
            required: -delta,
        });
    }
    Ok(account.referral_balance)
}

/// Adjusts an account's balance and its deposit/spend counters.
///
/// # Arguments
/// * `account_id` - Account to mutate
/// * `delta` - Signed amount; positive credits, negative debits
pub async fn adjust_balance(db: &DatabaseConnection, account_id: i64, delta: f64) -> Result<f64> {
    validate_delta(delta)?;
    let txn = db.begin().await?;
    let balance = apply_balance_delta(&txn, account_id, delta, Movement::Counted).await?;
    txn.commit().await?;
    Ok(balance)
}

/// Adjusts an account's referral balance. Counters are left alone.
pub async fn adjust_referral_balance(
    db: &DatabaseConnection,
    account_id: i64,
    delta: f64,
) -> Result<f64> {
    validate_delta(delta)?;
    let txn = db.begin().await?;
    let balance = apply_referral_delta(&txn, account_id, delta).await?;
    txn.commit().await?;
    Ok(balance)
}

/// Increments `games_played`, returning the new count.
pub async fn record_game(db: &DatabaseConnection, account_id: i64) -> Result<i64> {
    let result = Account::update_many()
        .col_expr(
            AccountColumn::GamesPlayed,
            Expr::col(AccountColumn::GamesPlayed).add(1),
        )
        .filter(AccountColumn::Id.eq(account_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::AccountNotFound { account_id });
    }
    Ok(require_account(db, account_id).await?.games_played)
}

/// Spendable plus referral balance.
pub async fn total_balance<C>(db: &C, account_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let account = require_account(db, account_id).await?;
    Ok(account.balance + account.referral_balance)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::{create_funded_account, setup_test_db};

    #[tokio::test]
    async fn test_adjust_balance_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = adjust_balance(&db, 1, f64::NAN).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = adjust_balance(&db, 1, f64::INFINITY).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = adjust_referral_balance(&db, 1, f64::NEG_INFINITY).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_register_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;

        let first = register_account(&db, 10, Some("alice".to_string()), None).await?;
        assert!(first.created);
        assert_eq!(first.account.balance, 0.0);

        let second = register_account(&db, 10, Some("alice_renamed".to_string()), None).await?;
        assert!(!second.created);
        assert_eq!(second.account.username.as_deref(), Some("alice_renamed"));
        Ok(())
    }

    #[tokio::test]
    async fn test_referrer_set_once() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        register_account(&db, 2, None, None).await?;

        let reg = register_account(&db, 3, None, Some(1)).await?;
        assert!(reg.referrer_attached);
        assert_eq!(reg.account.referrer_id, Some(1));

        // A second referrer never replaces the first
        let reg = register_account(&db, 3, None, Some(2)).await?;
        assert!(!reg.referrer_attached);
        assert_eq!(reg.account.referrer_id, Some(1));

        assert_eq!(require_account(&db, 1).await?.referral_count, 1);
        assert_eq!(require_account(&db, 2).await?.referral_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_self_and_unknown_referrers_ignored() -> Result<()> {
        let db = setup_test_db().await?;

        let reg = register_account(&db, 5, None, Some(5)).await?;
        assert_eq!(reg.account.referrer_id, None);

        let reg = register_account(&db, 6, None, Some(999)).await?;
        assert!(!reg.referrer_attached);
        assert_eq!(reg.account.referrer_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_balance_tracks_counters() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;

        assert_eq!(adjust_balance(&db, 1, 10.0).await?, 10.0);
        assert_eq!(adjust_balance(&db, 1, -4.0).await?, 6.0);

        let account = require_account(&db, 1).await?;
        assert_eq!(account.total_deposited, 10.0);
        assert_eq!(account.total_spent, 4.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_delta_is_noop() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 7.5).await?;

        assert_eq!(adjust_balance(&db, 1, 0.0).await?, 7.5);
        let account = require_account(&db, 1).await?;
        assert_eq!(account.total_spent, 0.0);

        let result = adjust_balance(&db, 42, 0.0).await;
        assert!(matches!(
            result,
            Err(Error::AccountNotFound { account_id: 42 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_change() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 5.0).await?;

        let result = adjust_balance(&db, 1, -6.0).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds { current, required }) if current == 5.0 && required == 6.0
        ));

        let account = require_account(&db, 1).await?;
        assert_eq!(account.balance, 5.0);
        assert_eq!(account.total_spent, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_account() -> Result<()> {
        let db = setup_test_db().await?;
        let result = adjust_balance(&db, 77, 1.0).await;
        assert!(matches!(
            result,
            Err(Error::AccountNotFound { account_id: 77 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_uncounted_movement_leaves_counters() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;

        apply_balance_delta(&db, 1, 3.0, Movement::Uncounted).await?;
        apply_balance_delta(&db, 1, -1.0, Movement::Uncounted).await?;

        let account = require_account(&db, 1).await?;
        assert_eq!(account.balance, 2.0);
        assert_eq!(account.total_deposited, 0.0);
        assert_eq!(account.total_spent, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_referral_balance_independent() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 4.0).await?;

        assert_eq!(adjust_referral_balance(&db, 1, 0.3).await?, 0.3);
        let result = adjust_referral_balance(&db, 1, -1.0).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        assert_eq!(total_balance(&db, 1).await?, 4.3);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_game() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;

        assert_eq!(record_game(&db, 1).await?, 1);
        assert_eq!(record_game(&db, 1).await?, 2);
        assert!(record_game(&db, 2).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_cent_debits_drain_to_zero() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;

        assert_eq!(adjust_balance(&db, 1, 0.3).await?, 0.3);
        assert_eq!(adjust_balance(&db, 1, -0.1).await?, 0.2);
        assert_eq!(adjust_balance(&db, 1, -0.1).await?, 0.1);
        assert_eq!(adjust_balance(&db, 1, -0.1).await?, 0.0);

        let account = require_account(&db, 1).await?;
        assert_eq!(account.total_deposited, 0.3);
        assert_eq!(account.total_spent, 0.3);

        assert_eq!(adjust_referral_balance(&db, 1, 0.3).await?, 0.3);
        for _ in 0..3 {
            adjust_referral_balance(&db, 1, -0.1).await?;
        }
        assert_eq!(require_account(&db, 1).await?.referral_balance, 0.0);
        Ok(())
    }
}
