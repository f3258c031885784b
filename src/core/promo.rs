//! Promo code business logic - administration and one-shot activation.
//!
//! Activation is all-or-nothing inside one transaction:
//! 1. the `(code, account)` activation row is inserted; a uniqueness
//!    violation means the account already redeemed the code;
//! 2. `current_activations` is incremented by an `UPDATE` guarded with
//!    `current_activations < max_activations`; zero affected rows means the
//!    cap is reached and the activation row is rolled back with it;
//! 3. the reward is credited to the account.

use crate::{
    core::account::{self, Movement, validate_positive},
    entities::{
        PromoActivation, PromoActivationColumn, PromoCode, PromoCodeColumn, promo_activation,
        promo_code,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{QueryOrder, Set, SqlErr, TransactionTrait, prelude::*};
use tracing::{debug, info};

/// Why an activation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoRejection {
    /// The account already redeemed this code
    AlreadyActivated,
    /// No such code
    NotFound,
    /// The code's expiry has passed
    Expired,
    /// Every activation has been used
    LimitReached,
}

impl std::fmt::Display for PromoRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::AlreadyActivated => "already activated",
            Self::NotFound => "not found",
            Self::Expired => "expired",
            Self::LimitReached => "activation limit reached",
        };
        f.write_str(text)
    }
}

/// Outcome of [`activate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// The reward was credited.
    Granted {
        /// Amount credited
        reward: f64,
        /// Account balance after the credit
        new_balance: f64,
    },
    /// Nothing was changed.
    Rejected(PromoRejection),
}

/// Canonical form of a code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Redeems `code` for `account_id`, checking expiry against `now`.
pub async fn activate(
    db: &DatabaseConnection,
    code: &str,
    account_id: i64,
    now: DateTime<Utc>,
) -> Result<Activation> {
    let code = normalize_code(code);
    let txn = db.begin().await?;

    let Some(promo) = PromoCode::find_by_id(code.clone()).one(&txn).await? else {
        txn.rollback().await?;
        return Ok(Activation::Rejected(PromoRejection::NotFound));
    };
    if promo.expires_at.is_some_and(|expiry| expiry <= now) {
        txn.rollback().await?;
        return Ok(Activation::Rejected(PromoRejection::Expired));
    }
    account::require_account(&txn, account_id).await?;

    let inserted = PromoActivation::insert(promo_activation::ActiveModel {
        promo_code: Set(code.clone()),
        account_id: Set(account_id),
        activated_at: Set(now),
    })
    .exec_without_returning(&txn)
    .await;
    match inserted {
        Ok(_) => {}
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            txn.rollback().await?;
            return Ok(Activation::Rejected(PromoRejection::AlreadyActivated));
        }
        Err(err) => return Err(err.into()),
    }

    let claimed = PromoCode::update_many()
        .col_expr(
            PromoCodeColumn::CurrentActivations,
            Expr::col(PromoCodeColumn::CurrentActivations).add(1),
        )
        .filter(PromoCodeColumn::Code.eq(code.as_str()))
        .filter(
            Expr::col(PromoCodeColumn::CurrentActivations)
                .lt(Expr::col(PromoCodeColumn::MaxActivations)),
        )
        .exec(&txn)
        .await?;
    if claimed.rows_affected == 0 {
        // Drops the activation row inserted above
        txn.rollback().await?;
        return Ok(Activation::Rejected(PromoRejection::LimitReached));
    }

    let new_balance =
        account::apply_balance_delta(&txn, account_id, promo.reward_amount, Movement::Uncounted)
            .await?;
    txn.commit().await?;

    debug!("Promo {} redeemed by {}", code, account_id);
    Ok(Activation::Granted {
        reward: promo.reward_amount,
        new_balance,
    })
}

/// Creates a promo code.
///
/// # Arguments
/// * `code` - Normalized before storing
/// * `reward_amount` - Credited per activation, must be positive
/// * `max_activations` - At least one
/// * `expires_at` - Optional expiry
/// * `created_by` - Admin account id
pub async fn create_promo(
    db: &DatabaseConnection,
    code: &str,
    reward_amount: f64,
    max_activations: i32,
    expires_at: Option<DateTime<Utc>>,
    created_by: i64,
) -> Result<promo_code::Model> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(Error::InvalidInput {
            message: "Promo code cannot be empty".to_string(),
        });
    }
    validate_positive(reward_amount)?;
    if max_activations < 1 {
        return Err(Error::InvalidInput {
            message: format!("max activations must be at least 1, got {max_activations}"),
        });
    }

    let model = promo_code::Model {
        code: code.clone(),
        reward_amount,
        max_activations,
        current_activations: 0,
        expires_at,
        created_by,
        created_at: Utc::now(),
    };
    let active: promo_code::ActiveModel = model.clone().into();
    match PromoCode::insert(active).exec_without_returning(db).await {
        Ok(_) => {
            info!("Created promo {} ({} x {:.2})", code, max_activations, reward_amount);
            Ok(model)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::DuplicatePromo { code })
        }
        Err(err) => Err(err.into()),
    }
}

/// Retrieves a promo code by (un-normalized) name.
pub async fn get_promo<C>(db: &C, code: &str) -> Result<Option<promo_code::Model>>
where
    C: ConnectionTrait,
{
    PromoCode::find_by_id(normalize_code(code))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All promo codes, newest first.
pub async fn list_promos<C>(db: &C) -> Result<Vec<promo_code::Model>>
where
    C: ConnectionTrait,
{
    PromoCode::find()
        .order_by_desc(PromoCodeColumn::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Removes a promo code together with its activation records.
pub async fn delete_promo(db: &DatabaseConnection, code: &str) -> Result<()> {
    let code = normalize_code(code);
    let txn = db.begin().await?;

    PromoActivation::delete_many()
        .filter(PromoActivationColumn::PromoCode.eq(code.as_str()))
        .exec(&txn)
        .await?;
    let deleted = PromoCode::delete_by_id(code.clone()).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        txn.rollback().await?;
        return Err(Error::PromoNotFound { code });
    }

    txn.commit().await?;
    info!("Deleted promo {}", code);
    Ok(())
}
