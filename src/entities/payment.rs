//! Payment entity - one row per provider invoice.
//!
//! `status` only ever moves `pending -> paid` or `pending -> failed`, and the
//! conditional UPDATE that performs that move is the idempotency guard for
//! the balance credit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an invoice
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentStatus {
    /// Invoice issued, not yet resolved
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Provider confirmed payment; balance credited
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Invoice expired or was cancelled
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl PaymentStatus {
    /// Lower-case name as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Provider invoice identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub invoice_id: String,
    /// Account that will be credited
    pub account_id: i64,
    /// Invoice amount
    pub amount: f64,
    /// Current lifecycle state
    pub status: PaymentStatus,
    /// When the invoice was requested
    pub created_at: DateTimeUtc,
    /// When the invoice reached a terminal state
    pub resolved_at: Option<DateTimeUtc>,
}

/// Each payment belongs to one account
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
