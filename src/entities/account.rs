//! Account entity - one row per chat user.
//!
//! The primary key is the stable user identifier handed to us by the chat
//! platform, so accounts are never renumbered. Monetary columns are plain
//! `REAL`; non-negativity is enforced by the ledger, not by the column.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Chat platform user identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Last known display name
    pub username: Option<String>,
    /// Spendable balance
    pub balance: f64,
    /// Balance earned from referral bonuses
    pub referral_balance: f64,
    /// Sum of all positive balance adjustments
    pub total_deposited: f64,
    /// Sum of all negative balance adjustments
    pub total_spent: f64,
    /// Number of game rounds played
    pub games_played: i64,
    /// Number of accounts that registered with this account as referrer
    pub referral_count: i64,
    /// Number of referred accounts that made a qualifying deposit
    pub active_referrals_count: i64,
    /// Account that invited this one; set at most once
    pub referrer_id: Option<i64>,
    /// Latch: the referrer has been paid for this account
    pub referral_bonus_given: bool,
    /// When the account was first seen
    pub created_at: DateTimeUtc,
}

/// Accounts own payments, withdrawals, promo activations and a share code
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    /// One account has many withdrawals
    #[sea_orm(has_many = "super::withdrawal::Entity")]
    Withdrawals,
    /// One account has many promo activations
    #[sea_orm(has_many = "super::promo_activation::Entity")]
    PromoActivations,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::withdrawal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Withdrawals.def()
    }
}

impl Related<super::promo_activation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoActivations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
