//! Payment lifecycle - invoices move `pending -> paid` or `pending -> failed`
//! exactly once.
//!
//! The status `UPDATE` filtered on `status = pending` is the idempotency
//! guard: only the call whose update changes a row credits the balance and
//! evaluates the referral bonus, inside the same transaction.

use crate::{
    config::LedgerConfig,
    core::{
        StatusChange,
        account::{self, Movement},
        referral::{self, ReferralPolicy},
    },
    entities::{Payment, PaymentColumn, PaymentStatus, payment},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, SqlErr, TransactionTrait, prelude::*};
use tracing::{debug, info};

/// Accepted invoice range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepositLimits {
    /// Smallest invoice
    pub min: f64,
    /// Largest invoice
    pub max: f64,
}

impl From<&LedgerConfig> for DepositLimits {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            min: config.min_deposit,
            max: config.max_deposit,
        }
    }
}

/// Registers a new pending invoice.
pub async fn create_payment(
    db: &DatabaseConnection,
    account_id: i64,
    invoice_id: &str,
    amount: f64,
    limits: DepositLimits,
) -> Result<payment::Model> {
    let invoice_id = invoice_id.trim();
    if invoice_id.is_empty() {
        return Err(Error::InvalidInput {
            message: "Invoice id cannot be empty".to_string(),
        });
    }
    if !amount.is_finite() || amount < limits.min || amount > limits.max {
        return Err(Error::InvalidAmount { amount });
    }

    let txn = db.begin().await?;
    account::require_account(&txn, account_id).await?;

    let model = payment::Model {
        invoice_id: invoice_id.to_string(),
        account_id,
        amount,
        status: PaymentStatus::Pending,
        created_at: Utc::now(),
        resolved_at: None,
    };
    let active: payment::ActiveModel = model.clone().into();
    match Payment::insert(active).exec_without_returning(&txn).await {
        Ok(_) => {}
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            return Err(Error::DuplicateInvoice {
                invoice_id: invoice_id.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    }
    txn.commit().await?;

    debug!("Invoice {} opened for {} ({:.2})", invoice_id, account_id, amount);
    Ok(model)
}

async fn transition<C>(db: &C, invoice_id: &str, to: PaymentStatus) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Payment::update_many()
        .set(payment::ActiveModel {
            status: Set(to),
            resolved_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(PaymentColumn::InvoiceId.eq(invoice_id))
        .filter(PaymentColumn::Status.eq(PaymentStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Explains why a guarded transition did not apply.
async fn unchanged<C>(db: &C, invoice_id: &str, to: PaymentStatus) -> Result<StatusChange>
where
    C: ConnectionTrait,
{
    let existing = Payment::find_by_id(invoice_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::PaymentNotFound {
            invoice_id: invoice_id.to_string(),
        })?;

    if existing.status == to {
        Ok(StatusChange::NoOp {
            account_id: existing.account_id,
        })
    } else {
        Err(Error::InvalidTransition {
            entity: "payment",
            key: invoice_id.to_string(),
            from: existing.status.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// Marks an invoice paid, crediting the account on the first call only.
///
/// A repeat delivery returns [`StatusChange::NoOp`]; an invoice that
/// already failed is an [`Error::InvalidTransition`].
pub async fn mark_paid(
    db: &DatabaseConnection,
    invoice_id: &str,
    policy: &ReferralPolicy,
) -> Result<StatusChange> {
    let txn = db.begin().await?;

    if !transition(&txn, invoice_id, PaymentStatus::Paid).await? {
        let outcome = unchanged(&txn, invoice_id, PaymentStatus::Paid).await;
        txn.rollback().await?;
        return outcome;
    }

    let payment = Payment::find_by_id(invoice_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| Error::PaymentNotFound {
            invoice_id: invoice_id.to_string(),
        })?;
    account::apply_balance_delta(&txn, payment.account_id, payment.amount, Movement::Counted)
        .await?;
    let referral = referral::on_deposit(&txn, payment.account_id, payment.amount, policy).await?;
    txn.commit().await?;

    info!(
        "Invoice {} paid: {:.2} credited to {}",
        invoice_id, payment.amount, payment.account_id
    );
    Ok(StatusChange::Applied {
        account_id: payment.account_id,
        amount: payment.amount,
        referral,
    })
}

/// Marks an invoice failed. No balance moves.
pub async fn mark_failed(db: &DatabaseConnection, invoice_id: &str) -> Result<StatusChange> {
    let txn = db.begin().await?;

    if !transition(&txn, invoice_id, PaymentStatus::Failed).await? {
        let outcome = unchanged(&txn, invoice_id, PaymentStatus::Failed).await;
        txn.rollback().await?;
        return outcome;
    }

    let payment = Payment::find_by_id(invoice_id.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| Error::PaymentNotFound {
            invoice_id: invoice_id.to_string(),
        })?;
    txn.commit().await?;

    debug!("Invoice {} failed", invoice_id);
    Ok(StatusChange::Applied {
        account_id: payment.account_id,
        amount: payment.amount,
        referral: None,
    })
}

/// Retrieves one invoice.
pub async fn get_payment<C>(db: &C, invoice_id: &str) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find_by_id(invoice_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Invoices of one account that are still pending, oldest first.
pub async fn pending_payments<C>(db: &C, account_id: i64) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(PaymentColumn::AccountId.eq(account_id))
        .filter(PaymentColumn::Status.eq(PaymentStatus::Pending))
        .order_by_asc(PaymentColumn::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::account::{register_account, require_account};
    use crate::test_utils::setup_test_db;

    const LIMITS: DepositLimits = DepositLimits {
        min: 1.0,
        max: 10_000.0,
    };
    const POLICY: ReferralPolicy = ReferralPolicy {
        bonus: 0.3,
        threshold: 2.0,
    };

    #[tokio::test]
    async fn test_create_payment_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_payment(&db, 1, "inv", 0.5, LIMITS).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = create_payment(&db, 1, "inv", 10_000.01, LIMITS).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = create_payment(&db, 1, "  ", 5.0, LIMITS).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_invoice() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        create_payment(&db, 1, "inv-1", 5.0, LIMITS).await?;

        let result = create_payment(&db, 1, "inv-1", 5.0, LIMITS).await;
        assert!(matches!(result, Err(Error::DuplicateInvoice { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_paid_credits_once() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        create_payment(&db, 1, "inv-1", 5.0, LIMITS).await?;

        let first = mark_paid(&db, "inv-1", &POLICY).await?;
        assert!(first.is_applied());
        assert_eq!(first.account_id(), 1);

        let second = mark_paid(&db, "inv-1", &POLICY).await?;
        assert_eq!(second, StatusChange::NoOp { account_id: 1 });

        let account = require_account(&db, 1).await?;
        assert_eq!(account.balance, 5.0);
        assert_eq!(account.total_deposited, 5.0);

        let stored = get_payment(&db, "inv-1").await?.unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert!(stored.resolved_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_invoice_is_terminal() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        create_payment(&db, 1, "inv-2", 5.0, LIMITS).await?;

        assert!(mark_failed(&db, "inv-2").await?.is_applied());
        assert_eq!(
            mark_failed(&db, "inv-2").await?,
            StatusChange::NoOp { account_id: 1 }
        );

        let result = mark_paid(&db, "inv-2", &POLICY).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        assert_eq!(require_account(&db, 1).await?.balance, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_invoice() -> Result<()> {
        let db = setup_test_db().await?;
        let result = mark_paid(&db, "ghost", &POLICY).await;
        assert!(matches!(result, Err(Error::PaymentNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_referral_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 100, None, None).await?; // B
        register_account(&db, 200, None, Some(100)).await?; // A
        create_payment(&db, 200, "a-1", 2.0, LIMITS).await?;
        create_payment(&db, 200, "a-2", 2.0, LIMITS).await?;

        let first = mark_paid(&db, "a-1", &POLICY).await?;
        assert!(matches!(
            first,
            StatusChange::Applied { referral: Some(credit), .. } if credit.referrer_id == 100
        ));
        assert_eq!(require_account(&db, 100).await?.referral_balance, 0.3);
        assert!(require_account(&db, 200).await?.referral_bonus_given);

        let second = mark_paid(&db, "a-2", &POLICY).await?;
        assert!(matches!(second, StatusChange::Applied { referral: None, .. }));
        assert_eq!(require_account(&db, 100).await?.referral_balance, 0.3);
        assert_eq!(require_account(&db, 200).await?.balance, 4.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_payments() -> Result<()> {
        let db = setup_test_db().await?;
        register_account(&db, 1, None, None).await?;
        create_payment(&db, 1, "p-1", 5.0, LIMITS).await?;
        create_payment(&db, 1, "p-2", 6.0, LIMITS).await?;
        mark_paid(&db, "p-1", &POLICY).await?;

        let pending = pending_payments(&db, 1).await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].invoice_id, "p-2");
        Ok(())
    }
}
