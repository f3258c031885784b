//! Game and text settings.

use crate::{
    entities::{
        GameSetting, GameSettingColumn, TextSetting, TextSettingColumn, game_setting,
        text_setting,
    },
    errors::{Error, Result},
};
use sea_orm::sea_query::OnConflict;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// Win chances (percent) and payout multipliers seeded on first start.
pub const DEFAULT_GAME_SETTINGS: &[(&str, f64)] = &[
    ("duel_win_chance", 7.0),
    ("dice_win_chance", 5.0),
    ("basketball_win_chance", 10.0),
    ("slots_win_chance", 4.0),
    ("lottery_win_chance", 1.0),
    ("wheel_win_chance", 3.0),
    ("duel_multiplier", 1.8),
    ("dice_multiplier", 3.0),
    ("basketball_multiplier", 1.5),
    ("slots_multiplier", 5.0),
    ("lottery_multiplier", 4.0),
    ("wheel_multiplier", 4.0),
];

/// Canonical form of a setting key, applied on every read and write path.
#[must_use]
pub fn normalize_key(key: &str) -> &str {
    key.trim()
}

fn validate_key(key: &str) -> Result<&str> {
    let key = normalize_key(key);
    if key.is_empty() {
        return Err(Error::InvalidInput {
            message: "Setting key cannot be empty".to_string(),
        });
    }
    Ok(key)
}

/// Numeric setting value, if present.
pub async fn get_game_setting<C>(db: &C, key: &str) -> Result<Option<f64>>
where
    C: ConnectionTrait,
{
    Ok(GameSetting::find_by_id(normalize_key(key).to_string())
        .one(db)
        .await?
        .map(|s| s.value))
}

/// Every numeric setting, ordered by key.
pub async fn all_game_settings<C>(db: &C) -> Result<Vec<game_setting::Model>>
where
    C: ConnectionTrait,
{
    GameSetting::find()
        .order_by_asc(GameSettingColumn::Key)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Inserts or replaces a numeric setting.
pub async fn set_game_setting<C>(db: &C, key: &str, value: f64) -> Result<()>
where
    C: ConnectionTrait,
{
    let key = validate_key(key)?;
    if !value.is_finite() {
        return Err(Error::InvalidAmount { amount: value });
    }

    GameSetting::insert(game_setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value),
        updated_at: Set(chrono::Utc::now()),
    })
    .on_conflict(
        OnConflict::column(GameSettingColumn::Key)
            .update_columns([GameSettingColumn::Value, GameSettingColumn::UpdatedAt])
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    debug!("Game setting {} = {}", key, value);
    Ok(())
}

/// Text setting value, if present.
pub async fn get_text_setting<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    Ok(TextSetting::find_by_id(normalize_key(key).to_string())
        .one(db)
        .await?
        .map(|s| s.value))
}

/// Every text setting, ordered by key.
pub async fn all_text_settings<C>(db: &C) -> Result<Vec<text_setting::Model>>
where
    C: ConnectionTrait,
{
    TextSetting::find()
        .order_by_asc(TextSettingColumn::Key)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Inserts or replaces a text setting.
pub async fn set_text_setting<C>(db: &C, key: &str, value: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let key = validate_key(key)?;

    TextSetting::insert(text_setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
        updated_at: Set(chrono::Utc::now()),
    })
    .on_conflict(
        OnConflict::column(TextSettingColumn::Key)
            .update_columns([TextSettingColumn::Value, TextSettingColumn::UpdatedAt])
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    debug!("Text setting {} updated", key);
    Ok(())
}
