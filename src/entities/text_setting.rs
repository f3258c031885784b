//! Text setting entity - free-form strings shown by the chat layer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Text setting database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "text_settings")]
pub struct Model {
    /// Setting key
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Stored text
    pub value: String,
    /// When the value was last written
    pub updated_at: DateTimeUtc,
}

/// `TextSetting` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
