//! Game setting entity - numeric tuning knobs (win chances, multipliers).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Game setting database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "game_settings")]
pub struct Model {
    /// Setting key (e.g. `"dice_win_chance"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Numeric value
    pub value: f64,
    /// When the value was last written
    pub updated_at: DateTimeUtc,
}

/// `GameSetting` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
