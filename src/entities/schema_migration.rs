//! Schema migration entity - one row per applied schema version.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Applied migration record
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schema_migrations")]
pub struct Model {
    /// Monotonic schema version
    #[sea_orm(primary_key, auto_increment = false)]
    pub version: i32,
    /// Migration name, for humans
    pub name: String,
    /// When it was applied
    pub applied_at: DateTimeUtc,
}

/// `SchemaMigration` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
