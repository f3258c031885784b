//! Audit log entity - append-only record of balance-affecting actions.
//!
//! Rows are never updated or deleted. There is deliberately no foreign key
//! to `accounts`; an audit append must never be the reason a write fails.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    /// Sequence number
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Account the action applied to
    pub account_id: i64,
    /// Action kind, see `core::audit::AuditAction`
    pub action: String,
    /// Signed amount moved by the action
    pub amount: f64,
    /// Human-readable context (invoice id, promo code, ...)
    pub reason: String,
    /// When the entry was appended
    pub created_at: DateTimeUtc,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
