//! `Ledger` - the entry point collaborators use.
//!
//! Mutations go to the writer actor; query views run on the reader pool
//! under the configured read timeout, concurrently with writes.

use crate::{
    cache::SettingsCache,
    config::{LedgerConfig, database},
    core::{
        StatusChange, account,
        audit::recent_entries,
        payment, promo,
        promo::Activation,
        referral, settings,
        views::{self, Leaderboard, LeaderboardEntry},
        withdrawal,
    },
    entities::{
        AccountModel, AuditLogModel, GameSettingModel, PaymentModel, PromoCodeModel,
        WithdrawalModel,
    },
    errors::{Error, Result},
    migrations,
    writer::{CheckpointReport, Committed, LedgerStats, WriterHandle, spawn_writer},
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Handle to an open ledger. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Ledger {
    writer: WriterHandle,
    reader: DatabaseConnection,
    config: LedgerConfig,
    settings: SettingsCache,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ledger {
    /// Connects, migrates, spawns the writer and loads the settings cache.
    #[instrument(skip(config))]
    pub async fn open(url: &str, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let handles = database::connect(url, config.reader_pool_size).await?;
        let version = migrations::run_migrations(&handles.writer).await?;
        info!("Ledger schema at version {}", version);

        let (writer, task) = spawn_writer(handles.writer, &config);
        let settings = SettingsCache::new();
        settings.refresh(&handles.reader).await?;

        Ok(Self {
            writer,
            reader: handles.reader,
            config,
            settings,
            task: Mutex::new(Some(task)),
        })
    }

    /// Effective configuration
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Writer counters
    #[must_use]
    pub fn stats(&self) -> &LedgerStats {
        self.writer.stats()
    }

    /// Direct access to the writer for mutations without a wrapper here
    #[must_use]
    pub const fn writer(&self) -> &WriterHandle {
        &self.writer
    }

    /// Hot-reloaded settings
    #[must_use]
    pub const fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    async fn read<T>(&self, query: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.read_timeout(), query)
            .await
            .map_err(|_| Error::ReadTimeout {
                millis: self.config.read_timeout_ms,
            })?
    }

    // --- Mutations -------------------------------------------------------

    /// Creates or refreshes an account, attaching a referrer if allowed.
    pub async fn register_account(
        &self,
        account_id: i64,
        username: Option<String>,
        referrer_id: Option<i64>,
    ) -> Result<Committed<account::Registration>> {
        self.writer
            .register_account(account_id, username, referrer_id)
            .await
    }

    /// Signed balance change counted toward deposit/spend totals.
    pub async fn adjust_balance(&self, account_id: i64, delta: f64) -> Result<Committed<f64>> {
        self.writer.adjust_balance(account_id, delta).await
    }

    /// Signed referral balance change.
    pub async fn adjust_referral_balance(
        &self,
        account_id: i64,
        delta: f64,
    ) -> Result<Committed<f64>> {
        self.writer.adjust_referral_balance(account_id, delta).await
    }

    /// Redeems a promo code against the current time.
    pub async fn activate_promo(
        &self,
        code: &str,
        account_id: i64,
    ) -> Result<Committed<Activation>> {
        self.writer
            .activate_promo(code, account_id, Utc::now())
            .await
    }

    /// Admin: creates a promo code.
    pub async fn create_promo(
        &self,
        code: &str,
        reward_amount: f64,
        max_activations: i32,
        expires_at: Option<DateTime<Utc>>,
        created_by: i64,
    ) -> Result<Committed<PromoCodeModel>> {
        self.writer
            .create_promo(code, reward_amount, max_activations, expires_at, created_by)
            .await
    }

    /// Invoice paid (provider event).
    pub async fn mark_paid(&self, invoice_id: &str) -> Result<Committed<StatusChange>> {
        self.writer.mark_paid(invoice_id).await
    }

    /// Invoice failed (provider event).
    pub async fn mark_failed(&self, invoice_id: &str) -> Result<Committed<StatusChange>> {
        self.writer.mark_failed(invoice_id).await
    }

    /// Upserts a numeric setting and reloads the settings cache.
    pub async fn set_game_setting(&self, key: &str, value: f64) -> Result<Committed<()>> {
        let committed = self.writer.set_game_setting(key, value).await?;
        self.reload_settings().await;
        Ok(committed)
    }

    /// Upserts a text setting and reloads the settings cache.
    pub async fn set_text_setting(&self, key: &str, value: &str) -> Result<Committed<()>> {
        let committed = self.writer.set_text_setting(key, value).await?;
        self.reload_settings().await;
        Ok(committed)
    }

    async fn reload_settings(&self) {
        if let Err(e) = self.settings.refresh(&self.reader).await {
            warn!("Settings cache stale after write: {}", e);
        }
    }

    // --- Query views -----------------------------------------------------

    /// Account row, if the account exists.
    pub async fn account(&self, account_id: i64) -> Result<Option<AccountModel>> {
        self.read(account::get_account(&self.reader, account_id))
            .await
    }

    /// Spendable balance.
    pub async fn balance(&self, account_id: i64) -> Result<f64> {
        self.read(async {
            Ok(account::require_account(&self.reader, account_id)
                .await?
                .balance)
        })
        .await
    }

    /// Spendable plus referral balance.
    pub async fn total_balance(&self, account_id: i64) -> Result<f64> {
        self.read(account::total_balance(&self.reader, account_id))
            .await
    }

    /// One invoice.
    pub async fn payment(&self, invoice_id: &str) -> Result<Option<PaymentModel>> {
        self.read(payment::get_payment(&self.reader, invoice_id))
            .await
    }

    /// Pending invoices of one account.
    pub async fn pending_payments(&self, account_id: i64) -> Result<Vec<PaymentModel>> {
        self.read(payment::pending_payments(&self.reader, account_id))
            .await
    }

    /// One withdrawal.
    pub async fn withdrawal(&self, withdrawal_id: i64) -> Result<Option<WithdrawalModel>> {
        self.read(withdrawal::get_withdrawal(&self.reader, withdrawal_id))
            .await
    }

    /// Withdrawals of one account, newest first.
    pub async fn withdrawals(&self, account_id: i64) -> Result<Vec<WithdrawalModel>> {
        self.read(withdrawal::withdrawals_for_account(&self.reader, account_id))
            .await
    }

    /// One promo code.
    pub async fn promo(&self, code: &str) -> Result<Option<PromoCodeModel>> {
        self.read(promo::get_promo(&self.reader, code)).await
    }

    /// Every promo code, newest first.
    pub async fn list_promos(&self) -> Result<Vec<PromoCodeModel>> {
        self.read(promo::list_promos(&self.reader)).await
    }

    /// Account behind a share code.
    pub async fn resolve_referral_code(&self, code: &str) -> Result<Option<i64>> {
        self.read(referral::resolve_referral_code(&self.reader, code))
            .await
    }

    /// Numeric setting straight from the store.
    pub async fn game_setting(&self, key: &str) -> Result<Option<f64>> {
        self.read(settings::get_game_setting(&self.reader, key))
            .await
    }

    /// Every numeric setting.
    pub async fn all_game_settings(&self) -> Result<Vec<GameSettingModel>> {
        self.read(settings::all_game_settings(&self.reader)).await
    }

    /// Text setting straight from the store.
    pub async fn text_setting(&self, key: &str) -> Result<Option<String>> {
        self.read(settings::get_text_setting(&self.reader, key))
            .await
    }

    /// Top accounts for a leaderboard.
    pub async fn leaderboard(
        &self,
        board: Leaderboard,
        limit: u64,
    ) -> Result<Vec<LeaderboardEntry>> {
        self.read(views::leaderboard(&self.reader, board, limit))
            .await
    }

    /// Sum of all balances owed to accounts.
    pub async fn total_liabilities(&self) -> Result<f64> {
        self.read(views::total_liabilities(&self.reader)).await
    }

    /// Audit entries, newest first.
    pub async fn audit_log(
        &self,
        account_id: Option<i64>,
        limit: u64,
    ) -> Result<Vec<AuditLogModel>> {
        self.read(recent_entries(&self.reader, account_id, limit))
            .await
    }

    // --- Lifecycle -------------------------------------------------------

    /// Forces a reconciling checkpoint.
    pub async fn checkpoint(&self) -> Result<CheckpointReport> {
        self.writer.checkpoint().await
    }

    /// Drains queued writes, truncates the WAL and waits for the writer.
    pub async fn shutdown(&self) -> Result<CheckpointReport> {
        let report = self.writer.shutdown().await?;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Writer task ended abnormally: {}", e);
            }
        }
        info!("Ledger shut down");
        Ok(report)
    }
}
