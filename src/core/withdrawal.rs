//! Withdrawal business logic.
//!
//! The amount is reserved (debited) in the same transaction that records the
//! pending request, so a balance can never be withdrawn twice while a payout
//! is in flight. Failing a withdrawal refunds the reservation. Neither moves
//! the deposit or spend totals.

use crate::{
    core::{
        StatusChange,
        account::{self, Movement},
    },
    entities::{Withdrawal, WithdrawalColumn, WithdrawalStatus, withdrawal},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Records a pending withdrawal and reserves its amount.
pub async fn request_withdrawal(
    db: &DatabaseConnection,
    account_id: i64,
    amount: f64,
    wallet_address: &str,
    min_withdrawal: f64,
) -> Result<withdrawal::Model> {
    if !amount.is_finite() || amount <= 0.0 || amount < min_withdrawal {
        return Err(Error::InvalidAmount { amount });
    }
    let wallet_address = wallet_address.trim();
    if wallet_address.is_empty() {
        return Err(Error::InvalidInput {
            message: "Wallet address cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;
    account::apply_balance_delta(&txn, account_id, -amount, Movement::Uncounted).await?;
    let created = withdrawal::ActiveModel {
        account_id: Set(account_id),
        amount: Set(amount),
        wallet_address: Set(wallet_address.to_string()),
        transfer_id: Set(None),
        status: Set(WithdrawalStatus::Pending),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(
        "Withdrawal {} requested by {} ({:.2})",
        created.id, account_id, amount
    );
    Ok(created)
}

async fn settle(
    db: &DatabaseConnection,
    withdrawal_id: i64,
    to: WithdrawalStatus,
    transfer_id: Option<String>,
) -> Result<StatusChange> {
    let txn = db.begin().await?;

    let mut update = withdrawal::ActiveModel {
        status: Set(to),
        ..Default::default()
    };
    if transfer_id.is_some() {
        update.transfer_id = Set(transfer_id);
    }
    let result = Withdrawal::update_many()
        .set(update)
        .filter(WithdrawalColumn::Id.eq(withdrawal_id))
        .filter(WithdrawalColumn::Status.eq(WithdrawalStatus::Pending))
        .exec(&txn)
        .await?;

    let existing = Withdrawal::find_by_id(withdrawal_id)
        .one(&txn)
        .await?
        .ok_or(Error::WithdrawalNotFound { withdrawal_id })?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        if existing.status == to {
            return Ok(StatusChange::NoOp {
                account_id: existing.account_id,
            });
        }
        return Err(Error::InvalidTransition {
            entity: "withdrawal",
            key: withdrawal_id.to_string(),
            from: existing.status.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    if to == WithdrawalStatus::Failed {
        account::apply_balance_delta(
            &txn,
            existing.account_id,
            existing.amount,
            Movement::Uncounted,
        )
        .await?;
    }
    txn.commit().await?;

    info!("Withdrawal {} {}", withdrawal_id, to.as_str());
    Ok(StatusChange::Applied {
        account_id: existing.account_id,
        amount: existing.amount,
        referral: None,
    })
}

/// Marks a withdrawal paid out by the provider.
pub async fn complete_withdrawal(
    db: &DatabaseConnection,
    withdrawal_id: i64,
    transfer_id: &str,
) -> Result<StatusChange> {
    settle(
        db,
        withdrawal_id,
        WithdrawalStatus::Completed,
        Some(transfer_id.to_string()),
    )
    .await
}

/// Marks a withdrawal failed and refunds the reserved amount.
pub async fn fail_withdrawal(db: &DatabaseConnection, withdrawal_id: i64) -> Result<StatusChange> {
    settle(db, withdrawal_id, WithdrawalStatus::Failed, None).await
}

/// Retrieves one withdrawal.
pub async fn get_withdrawal<C>(db: &C, withdrawal_id: i64) -> Result<Option<withdrawal::Model>>
where
    C: ConnectionTrait,
{
    Withdrawal::find_by_id(withdrawal_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All withdrawals of one account, newest first.
pub async fn withdrawals_for_account<C>(db: &C, account_id: i64) -> Result<Vec<withdrawal::Model>>
where
    C: ConnectionTrait,
{
    Withdrawal::find()
        .filter(WithdrawalColumn::AccountId.eq(account_id))
        .order_by_desc(WithdrawalColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::account::require_account;
    use crate::test_utils::{create_funded_account, setup_test_db};

    #[tokio::test]
    async fn test_reserve_at_request() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 10.0).await?;

        let w = request_withdrawal(&db, 1, 4.0, "wallet-1", 1.0).await?;
        assert_eq!(w.status, WithdrawalStatus::Pending);

        let account = require_account(&db, 1).await?;
        assert_eq!(account.balance, 6.0);
        assert_eq!(account.total_spent, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_request_validation() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 10.0).await?;

        let result = request_withdrawal(&db, 1, 0.5, "wallet", 1.0).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = request_withdrawal(&db, 1, 2.0, "  ", 1.0).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = request_withdrawal(&db, 1, 11.0, "wallet", 1.0).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Nothing was recorded for the refused overdraft
        assert!(withdrawals_for_account(&db, 1).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_once() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 10.0).await?;
        let w = request_withdrawal(&db, 1, 4.0, "wallet", 1.0).await?;

        assert!(complete_withdrawal(&db, w.id, "tx-9").await?.is_applied());
        assert_eq!(
            complete_withdrawal(&db, w.id, "tx-9").await?,
            StatusChange::NoOp { account_id: 1 }
        );

        let stored = get_withdrawal(&db, w.id).await?.unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Completed);
        assert_eq!(stored.transfer_id.as_deref(), Some("tx-9"));

        let result = fail_withdrawal(&db, w.id).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        assert_eq!(require_account(&db, 1).await?.balance, 6.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_refunds_once() -> Result<()> {
        let db = setup_test_db().await?;
        create_funded_account(&db, 1, 10.0).await?;
        let w = request_withdrawal(&db, 1, 4.0, "wallet", 1.0).await?;

        assert!(fail_withdrawal(&db, w.id).await?.is_applied());
        assert!(!fail_withdrawal(&db, w.id).await?.is_applied());

        let account = require_account(&db, 1).await?;
        assert_eq!(account.balance, 10.0);
        assert_eq!(account.total_deposited, 10.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_withdrawal() -> Result<()> {
        let db = setup_test_db().await?;
        let result = fail_withdrawal(&db, 404).await;
        assert!(matches!(
            result,
            Err(Error::WithdrawalNotFound { withdrawal_id: 404 })
        ));
        Ok(())
    }
}
