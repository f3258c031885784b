use crate::core::settings::{all_game_settings, all_text_settings, normalize_key};
use crate::errors::Result;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, trace};

/// In-memory snapshot of game and text settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    /// Numeric settings by key
    pub game: HashMap<String, f64>,
    /// Text settings by key
    pub text: HashMap<String, String>,
}

/// Shared settings snapshot, reloaded from the store after every settings
/// write so game logic sees changes without a restart.
#[derive(Debug, Clone, Default)]
pub struct SettingsCache {
    inner: Arc<RwLock<SettingsSnapshot>>,
}

impl SettingsCache {
    /// Empty cache; call [`SettingsCache::refresh`] before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with the current store contents.
    pub async fn refresh(&self, db: &DatabaseConnection) -> Result<()> {
        info!("Refreshing settings cache...");
        let game = all_game_settings(db)
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        let text = all_text_settings(db)
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        let mut cache_writer = self.inner.write().await;
        *cache_writer = SettingsSnapshot { game, text };
        info!(
            "Settings cache refreshed with {} game and {} text settings.",
            cache_writer.game.len(),
            cache_writer.text.len()
        );
        trace!("Settings cache now contains: {:?}", cache_writer);
        Ok(())
    }

    /// Cached numeric setting
    pub async fn game(&self, key: &str) -> Option<f64> {
        self.inner.read().await.game.get(normalize_key(key)).copied()
    }

    /// Cached text setting
    pub async fn text(&self, key: &str) -> Option<String> {
        self.inner.read().await.text.get(normalize_key(key)).cloned()
    }

    /// Copy of the whole snapshot
    pub async fn snapshot(&self) -> SettingsSnapshot {
        self.inner.read().await.clone()
    }
}
