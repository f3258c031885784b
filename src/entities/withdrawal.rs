//! Withdrawal entity - a payout request against an account balance.
//!
//! The amount is reserved (debited) when the row is inserted; a failed
//! withdrawal refunds it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payout
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum WithdrawalStatus {
    /// Funds reserved, transfer not yet confirmed
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Provider transfer succeeded
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Transfer failed; reservation refunded
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl WithdrawalStatus {
    /// Lower-case name as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Withdrawal database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawals")]
pub struct Model {
    /// Internal identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Account the funds were reserved from
    pub account_id: i64,
    /// Reserved amount
    pub amount: f64,
    /// Destination wallet
    pub wallet_address: String,
    /// Provider transfer id, known once completed
    pub transfer_id: Option<String>,
    /// Current lifecycle state
    pub status: WithdrawalStatus,
    /// When the withdrawal was requested
    pub created_at: DateTimeUtc,
}

/// Each withdrawal belongs to one account
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
