//! Promo code entity.
//!
//! Codes are stored upper-cased. `current_activations` never exceeds
//! `max_activations`; the activator increments it with a guarded UPDATE.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Promo code database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    /// Normalized code
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    /// Amount credited per activation
    pub reward_amount: f64,
    /// Activation cap
    pub max_activations: i32,
    /// Activations granted so far
    pub current_activations: i32,
    /// Optional expiry
    pub expires_at: Option<DateTimeUtc>,
    /// Admin who created the code
    pub created_by: i64,
    /// When the code was created
    pub created_at: DateTimeUtc,
}

/// A promo code has many activations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Activation records
    #[sea_orm(has_many = "super::promo_activation::Entity")]
    Activations,
}

impl Related<super::promo_activation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Activations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
