//! Audit trail of balance-affecting actions.
//!
//! Entries are appended after the financial unit of work has committed, on
//! their own. A failed append is reported to the caller but never undoes the
//! mutation it describes.

use crate::{
    entities::{AuditLog, AuditLogColumn, audit_log},
    errors::Result,
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};

/// What kind of action an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Direct signed balance adjustment (game rounds, admin corrections)
    BalanceAdjusted,
    /// Direct signed referral balance adjustment
    ReferralBalanceAdjusted,
    /// Invoice paid and credited
    Deposit,
    /// Invoice failed
    PaymentFailed,
    /// Promo reward credited
    PromoReward,
    /// Referral bonus credited to the referrer
    ReferralBonus,
    /// Withdrawal amount reserved
    WithdrawalReserved,
    /// Withdrawal paid out by the provider
    WithdrawalCompleted,
    /// Reserved withdrawal amount returned
    WithdrawalRefunded,
}

impl AuditAction {
    /// Name stored in the `action` column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BalanceAdjusted => "balance_adjusted",
            Self::ReferralBalanceAdjusted => "referral_balance_adjusted",
            Self::Deposit => "deposit",
            Self::PaymentFailed => "payment_failed",
            Self::PromoReward => "promo_reward",
            Self::ReferralBonus => "referral_bonus",
            Self::WithdrawalReserved => "withdrawal_reserved",
            Self::WithdrawalCompleted => "withdrawal_completed",
            Self::WithdrawalRefunded => "withdrawal_refunded",
        }
    }
}

/// An entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// Account the action applied to
    pub account_id: i64,
    /// Action kind
    pub action: AuditAction,
    /// Signed amount moved
    pub amount: f64,
    /// Context such as an invoice id or promo code
    pub reason: String,
}

impl AuditEntry {
    /// Builds an entry.
    pub fn new(account_id: i64, action: AuditAction, amount: f64, reason: impl Into<String>) -> Self {
        Self {
            account_id,
            action,
            amount,
            reason: reason.into(),
        }
    }
}

/// Appends entries in one statement. An empty slice does nothing.
pub async fn append<C>(db: &C, entries: &[AuditEntry]) -> Result<()>
where
    C: ConnectionTrait,
{
    if entries.is_empty() {
        return Ok(());
    }

    let now = chrono::Utc::now();
    let rows = entries.iter().map(|entry| audit_log::ActiveModel {
        account_id: Set(entry.account_id),
        action: Set(entry.action.as_str().to_string()),
        amount: Set(entry.amount),
        reason: Set(entry.reason.clone()),
        created_at: Set(now),
        ..Default::default()
    });
    AuditLog::insert_many(rows).exec_without_returning(db).await?;
    Ok(())
}

/// Newest entries first, optionally for one account.
pub async fn recent_entries<C>(
    db: &C,
    account_id: Option<i64>,
    limit: u64,
) -> Result<Vec<audit_log::Model>>
where
    C: ConnectionTrait,
{
    let mut query = AuditLog::find();
    if let Some(account_id) = account_id {
        query = query.filter(AuditLogColumn::AccountId.eq(account_id));
    }
    query
        .order_by_desc(AuditLogColumn::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}
