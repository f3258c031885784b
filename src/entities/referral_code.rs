//! Referral code entity - short share code per account.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Referral code database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_codes")]
pub struct Model {
    /// Account the code belongs to
    #[sea_orm(primary_key, auto_increment = false)]
    pub account_id: i64,
    /// Six character alphanumeric code
    #[sea_orm(unique)]
    pub short_code: String,
    /// When the code was generated
    pub created_at: DateTimeUtc,
}

/// Each code belongs to one account
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
