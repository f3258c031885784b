//! Promo activation entity - proof that a reward was granted.
//!
//! The composite primary key `(promo_code, account_id)` is the idempotency
//! guard: a second insert for the same pair fails with a uniqueness error.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Promo activation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_activations")]
pub struct Model {
    /// Activated code
    #[sea_orm(primary_key, auto_increment = false)]
    pub promo_code: String,
    /// Account that activated it
    #[sea_orm(primary_key, auto_increment = false)]
    pub account_id: i64,
    /// When the reward was granted
    pub activated_at: DateTimeUtc,
}

/// Activations link a code to an account
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The activated code
    #[sea_orm(
        belongs_to = "super::promo_code::Entity",
        from = "Column::PromoCode",
        to = "super::promo_code::Column::Code"
    )]
    PromoCode,
    /// The activating account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
}

impl Related<super::promo_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoCode.def()
    }
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
