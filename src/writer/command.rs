//! Messages accepted by the writer actor.

use super::{Committed, durability::CheckpointReport};
use crate::{
    core::{StatusChange, account::Registration, promo::Activation},
    entities::{PaymentModel, PromoCodeModel, WithdrawalModel},
    errors::Result,
};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// Reply channel for a mutating command
pub type Reply<T> = oneshot::Sender<Result<Committed<T>>>;

/// One unit of work for the writer. Every variant carries its reply channel.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum Command {
    /// Create or refresh an account
    RegisterAccount {
        account_id: i64,
        username: Option<String>,
        referrer_id: Option<i64>,
        reply: Reply<Registration>,
    },

    /// Signed balance change, counted toward deposit/spend totals
    AdjustBalance {
        account_id: i64,
        delta: f64,
        reply: Reply<f64>,
    },

    /// Signed referral balance change
    AdjustReferralBalance {
        account_id: i64,
        delta: f64,
        reply: Reply<f64>,
    },

    /// Bump the games-played counter
    RecordGame { account_id: i64, reply: Reply<i64> },

    /// Redeem a promo code
    ActivatePromo {
        code: String,
        account_id: i64,
        now: DateTime<Utc>,
        reply: Reply<Activation>,
    },

    /// Admin: create a promo code
    CreatePromo {
        code: String,
        reward_amount: f64,
        max_activations: i32,
        expires_at: Option<DateTime<Utc>>,
        created_by: i64,
        reply: Reply<PromoCodeModel>,
    },

    /// Admin: delete a promo code and its activations
    DeletePromo { code: String, reply: Reply<()> },

    /// Open a pending invoice
    CreatePayment {
        account_id: i64,
        invoice_id: String,
        amount: f64,
        reply: Reply<PaymentModel>,
    },

    /// Invoice paid
    MarkPaid {
        invoice_id: String,
        reply: Reply<StatusChange>,
    },

    /// Invoice expired or cancelled
    MarkFailed {
        invoice_id: String,
        reply: Reply<StatusChange>,
    },

    /// Reserve funds and record a pending withdrawal
    RequestWithdrawal {
        account_id: i64,
        amount: f64,
        wallet_address: String,
        reply: Reply<WithdrawalModel>,
    },

    /// Withdrawal paid out
    CompleteWithdrawal {
        withdrawal_id: i64,
        transfer_id: String,
        reply: Reply<StatusChange>,
    },

    /// Withdrawal failed; refund the reservation
    FailWithdrawal {
        withdrawal_id: i64,
        reply: Reply<StatusChange>,
    },

    /// Fetch or allocate the account's share code
    ReferralCode { account_id: i64, reply: Reply<String> },

    /// Upsert a numeric setting
    SetGameSetting {
        key: String,
        value: f64,
        reply: Reply<()>,
    },

    /// Upsert a text setting
    SetTextSetting {
        key: String,
        value: String,
        reply: Reply<()>,
    },

    /// Force a reconciling checkpoint
    Checkpoint {
        reply: oneshot::Sender<Result<CheckpointReport>>,
    },

    /// Drain the queue, truncate the WAL and stop
    Shutdown {
        reply: oneshot::Sender<Result<CheckpointReport>>,
    },
}
