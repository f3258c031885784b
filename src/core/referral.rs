//! Referral program - bonus latch and share codes.
//!
//! A referrer is paid once per referred account, on that account's first
//! qualifying deposit. The latch `referral_bonus_given` lives on the referred
//! account and is flipped by a guarded `UPDATE ... WHERE referral_bonus_given
//! = false`; only the call that flips it credits the referrer, and both
//! happen in the deposit's unit of work.

use crate::{
    config::LedgerConfig,
    core::account::{get_account, plus, require_account},
    entities::{Account, AccountColumn, ReferralCode, ReferralCodeColumn, referral_code},
    errors::{Error, Result},
};
use rand::{Rng, distributions::Alphanumeric};
use sea_orm::sea_query::Expr;
use sea_orm::{Set, SqlErr, TransactionTrait, prelude::*};
use tracing::{debug, info};

/// Length of generated share codes
pub const CODE_LENGTH: usize = 6;
const CODE_ATTEMPTS: usize = 8;

/// Bonus amount and qualifying threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferralPolicy {
    /// Credited to the referrer's referral balance
    pub bonus: f64,
    /// Smallest deposit that qualifies
    pub threshold: f64,
}

impl From<&LedgerConfig> for ReferralPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            bonus: config.referral_bonus,
            threshold: config.referral_min_deposit,
        }
    }
}

/// A bonus paid to a referrer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferralCredit {
    /// Account that received the bonus
    pub referrer_id: i64,
    /// Bonus amount
    pub bonus: f64,
}

/// Evaluates a deposit by `account_id` for a referral bonus.
///
/// Must run inside the unit of work that credits the deposit.
pub async fn on_deposit<C>(
    db: &C,
    account_id: i64,
    amount: f64,
    policy: &ReferralPolicy,
) -> Result<Option<ReferralCredit>>
where
    C: ConnectionTrait,
{
    let account = require_account(db, account_id).await?;
    let Some(referrer_id) = account.referrer_id else {
        return Ok(None);
    };
    if amount < policy.threshold || account.referral_bonus_given {
        return Ok(None);
    }

    let latched = Account::update_many()
        .col_expr(AccountColumn::ReferralBonusGiven, Expr::value(true))
        .filter(AccountColumn::Id.eq(account_id))
        .filter(AccountColumn::ReferralBonusGiven.eq(false))
        .exec(db)
        .await?;
    if latched.rows_affected == 0 {
        return Ok(None);
    }

    let credited = Account::update_many()
        .col_expr(
            AccountColumn::ReferralBalance,
            plus(AccountColumn::ReferralBalance, policy.bonus),
        )
        .col_expr(
            AccountColumn::ActiveReferralsCount,
            Expr::col(AccountColumn::ActiveReferralsCount).add(1),
        )
        .filter(AccountColumn::Id.eq(referrer_id))
        .exec(db)
        .await?;
    if credited.rows_affected == 0 {
        return Err(Error::AccountNotFound {
            account_id: referrer_id,
        });
    }

    info!(
        "Referral bonus {:.2} credited to {} for {}",
        policy.bonus, referrer_id, account_id
    );
    Ok(Some(ReferralCredit {
        referrer_id,
        bonus: policy.bonus,
    }))
}

fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(char::from)
        .collect()
}

/// Returns the account's share code, creating one on first request.
pub async fn referral_code(db: &DatabaseConnection, account_id: i64) -> Result<String> {
    if let Some(existing) = ReferralCode::find_by_id(account_id).one(db).await? {
        return Ok(existing.short_code);
    }
    require_account(db, account_id).await?;

    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        let txn = db.begin().await?;
        let inserted = ReferralCode::insert(referral_code::ActiveModel {
            account_id: Set(account_id),
            short_code: Set(code.clone()),
            created_at: Set(chrono::Utc::now()),
        })
        .exec_without_returning(&txn)
        .await;

        match inserted {
            Ok(_) => {
                txn.commit().await?;
                debug!("Issued referral code for {}", account_id);
                return Ok(code);
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await?;
                debug!("Referral code collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::InvalidInput {
        message: format!("could not allocate a unique referral code for {account_id}"),
    })
}

/// Maps a share code back to its account.
pub async fn resolve_referral_code<C>(db: &C, code: &str) -> Result<Option<i64>>
where
    C: ConnectionTrait,
{
    let found = ReferralCode::find()
        .filter(ReferralCodeColumn::ShortCode.eq(code.trim()))
        .one(db)
        .await?;
    match found {
        Some(row) => Ok(get_account(db, row.account_id).await?.map(|a| a.id)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::account::register_account;
    use crate::test_utils::setup_test_db;

    const POLICY: ReferralPolicy = ReferralPolicy {
        bonus: 0.3,
        threshold: 2.0,
    };

    #[tokio::test]
    async fn test_bonus_paid_once() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        register_account(&db, 2, None, Some(1)).await?;

        let credit = on_deposit(&db, 2, 2.0, &POLICY).await?;
        assert_eq!(
            credit,
            Some(ReferralCredit {
                referrer_id: 1,
                bonus: 0.3
            })
        );
        assert!(on_deposit(&db, 2, 5.0, &POLICY).await?.is_none());

        let referrer = require_account(&db, 1).await?;
        assert_eq!(referrer.referral_balance, 0.3);
        assert_eq!(referrer.active_referrals_count, 1);
        assert!(require_account(&db, 2).await?.referral_bonus_given);
        Ok(())
    }

    #[tokio::test]
    async fn test_small_deposit_does_not_latch() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        register_account(&db, 2, None, Some(1)).await?;

        assert!(on_deposit(&db, 2, 1.99, &POLICY).await?.is_none());
        assert!(!require_account(&db, 2).await?.referral_bonus_given);

        // A later qualifying deposit still pays
        assert!(on_deposit(&db, 2, 2.5, &POLICY).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_no_referrer_no_bonus() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        assert!(on_deposit(&db, 1, 100.0, &POLICY).await?.is_none());
        assert!(!require_account(&db, 1).await?.referral_bonus_given);
        Ok(())
    }

    #[tokio::test]
    async fn test_referral_code_stable_and_resolvable() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 9, None, None).await?;

        let code = referral_code(&db, 9).await?;
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(referral_code(&db, 9).await?, code);

        assert_eq!(resolve_referral_code(&db, &code).await?, Some(9));
        assert_eq!(resolve_referral_code(&db, "nope00").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_referral_code_requires_account() -> Result<()> {
        let db = setup_test_db().await?;
        let result = referral_code(&db, 31).await;
        assert!(matches!(
            result,
            Err(Error::AccountNotFound { account_id: 31 })
        ));
        Ok(())
    }
}
