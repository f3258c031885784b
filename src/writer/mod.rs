//! Single-writer actor for every ledger mutation.
//!
//! All mutating operations are sent as [`Command`]s over a bounded channel to
//! one task that owns the writer connection and runs them strictly in
//! submission order, one transaction at a time. Callers await a oneshot
//! reply; a caller that stops waiting does not cancel an admitted command,
//! which still runs to commit or rollback.
//!
//! After a unit of work commits, its audit entries are appended as a
//! separate relaxed write. The outcome of that append travels back with the
//! result in [`Committed::audit`] and never undoes the committed work.

/// Writer mailbox messages
pub mod command;
/// Flush policy and WAL checkpoints
pub mod durability;

pub use command::{Command, Reply};
pub use durability::{CheckpointMode, CheckpointReport, Durability, DurabilityController};

use crate::{
    config::LedgerConfig,
    core::{
        StatusChange,
        account::{self, Registration, validate_delta},
        audit::{self, AuditAction, AuditEntry},
        payment::{self, DepositLimits},
        promo::{self, Activation},
        referral::{self, ReferralPolicy},
        settings, withdrawal,
    },
    entities::{PaymentModel, PromoCodeModel, WithdrawalModel},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// What happened to the audit entries of a committed unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Entries were appended
    Recorded,
    /// The operation had nothing to record
    Skipped,
    /// The append failed; the financial mutation stands
    Failed(String),
}

/// A committed result together with its audit outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    /// Operation result
    pub value: T,
    /// Audit append outcome
    pub audit: AuditOutcome,
}

impl<T> Committed<T> {
    /// Drops the audit outcome.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Whether the primary operation succeeded but its audit append did not
    #[must_use]
    pub const fn audit_failed(&self) -> bool {
        matches!(self.audit, AuditOutcome::Failed(_))
    }
}

/// Counters exported by the writer.
#[derive(Debug, Default)]
pub struct LedgerStats {
    commands: AtomicU64,
    rejected: AtomicU64,
    audit_failures: AtomicU64,
    checkpoints: AtomicU64,
}

impl LedgerStats {
    /// Commands the writer has executed
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Commands that returned an error (and rolled back)
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Audit appends that failed after their work committed
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Successful checkpoints of any mode
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::Relaxed)
    }
}

/// The actor. Owns the writer connection.
struct LedgerWriter {
    db: DatabaseConnection,
    mailbox: mpsc::Receiver<Command>,
    config: LedgerConfig,
    durability: DurabilityController,
    stats: Arc<LedgerStats>,
}

impl LedgerWriter {
    async fn run(mut self) {
        let period = self.config.checkpoint_interval().max(Duration::from_millis(1));
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        timer.tick().await;

        loop {
            tokio::select! {
                received = self.mailbox.recv() => match received {
                    Some(Command::Shutdown { reply }) => {
                        let report = self.shutdown().await;
                        let _ = reply.send(report);
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        // Every handle dropped without an explicit shutdown
                        if let Err(e) = self.checkpoint(CheckpointMode::Truncate).await {
                            error!("Final checkpoint failed: {}", e);
                        }
                        break;
                    }
                },

                _ = timer.tick() => {
                    if let Err(e) = self.checkpoint(CheckpointMode::Full).await {
                        error!("Timed checkpoint failed: {}", e);
                    }
                }
            }
        }

        info!("Ledger writer stopped");
    }

    async fn shutdown(&mut self) -> Result<CheckpointReport> {
        self.mailbox.close();
        let mut drained = 0_usize;
        while let Some(command) = self.mailbox.recv().await {
            self.handle(command).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("Drained {} queued commands before shutdown", drained);
        }
        self.checkpoint(CheckpointMode::Truncate).await
    }

    async fn checkpoint(&mut self, mode: CheckpointMode) -> Result<CheckpointReport> {
        let report = self.durability.checkpoint(&self.db, mode).await?;
        self.stats.checkpoints.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Runs one unit of work and appends its audit entries.
    async fn unit<T>(
        &mut self,
        durability: Durability,
        work: impl Future<Output = Result<T>>,
        audit: impl FnOnce(&T) -> Vec<AuditEntry>,
    ) -> Result<Committed<T>> {
        self.stats.commands.fetch_add(1, Ordering::Relaxed);
        self.durability.prepare(&self.db, durability).await?;

        let value = match work.await {
            Ok(value) => value,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Command rejected: {}", e);
                return Err(e);
            }
        };
        self.durability.committed(&self.db, durability).await;

        let audit = self.record(audit(&value)).await;
        Ok(Committed { value, audit })
    }

    async fn record(&mut self, entries: Vec<AuditEntry>) -> AuditOutcome {
        if entries.is_empty() {
            return AuditOutcome::Skipped;
        }

        let appended = match self.durability.prepare(&self.db, Durability::Relaxed).await {
            Ok(()) => audit::append(&self.db, &entries).await,
            Err(e) => Err(e),
        };
        match appended {
            Ok(()) => {
                self.durability
                    .committed(&self.db, Durability::Relaxed)
                    .await;
                AuditOutcome::Recorded
            }
            Err(e) => {
                self.stats.audit_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Audit append failed for {} entries (account {}): {}",
                    entries.len(),
                    entries[0].account_id,
                    e
                );
                AuditOutcome::Failed(e.to_string())
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn handle(&mut self, command: Command) {
        let db = self.db.clone();
        let policy = ReferralPolicy::from(&self.config);
        let limits = DepositLimits::from(&self.config);
        let min_withdrawal = self.config.min_withdrawal;

        match command {
            Command::RegisterAccount {
                account_id,
                username,
                referrer_id,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        account::register_account(&db, account_id, username, referrer_id),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::AdjustBalance {
                account_id,
                delta,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        account::adjust_balance(&db, account_id, delta),
                        |_| balance_entries(account_id, AuditAction::BalanceAdjusted, delta),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::AdjustReferralBalance {
                account_id,
                delta,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        account::adjust_referral_balance(&db, account_id, delta),
                        |_| balance_entries(account_id, AuditAction::ReferralBalanceAdjusted, delta),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::RecordGame { account_id, reply } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        account::record_game(&db, account_id),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::ActivatePromo {
                code,
                account_id,
                now,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        promo::activate(&db, &code, account_id, now),
                        |activation| match activation {
                            Activation::Granted { reward, .. } => vec![AuditEntry::new(
                                account_id,
                                AuditAction::PromoReward,
                                *reward,
                                promo::normalize_code(&code),
                            )],
                            Activation::Rejected(_) => Vec::new(),
                        },
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::CreatePromo {
                code,
                reward_amount,
                max_activations,
                expires_at,
                created_by,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        promo::create_promo(
                            &db,
                            &code,
                            reward_amount,
                            max_activations,
                            expires_at,
                            created_by,
                        ),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::DeletePromo { code, reply } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        promo::delete_promo(&db, &code),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::CreatePayment {
                account_id,
                invoice_id,
                amount,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        payment::create_payment(&db, account_id, &invoice_id, amount, limits),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::MarkPaid { invoice_id, reply } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        payment::mark_paid(&db, &invoice_id, &policy),
                        |change| deposit_entries(change, &invoice_id),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::MarkFailed { invoice_id, reply } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        payment::mark_failed(&db, &invoice_id),
                        |change| match change {
                            StatusChange::Applied {
                                account_id, amount, ..
                            } => vec![AuditEntry::new(
                                *account_id,
                                AuditAction::PaymentFailed,
                                *amount,
                                invoice_id.clone(),
                            )],
                            StatusChange::NoOp { .. } => Vec::new(),
                        },
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::RequestWithdrawal {
                account_id,
                amount,
                wallet_address,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        withdrawal::request_withdrawal(
                            &db,
                            account_id,
                            amount,
                            &wallet_address,
                            min_withdrawal,
                        ),
                        |created| {
                            vec![AuditEntry::new(
                                account_id,
                                AuditAction::WithdrawalReserved,
                                -created.amount,
                                format!("withdrawal {}", created.id),
                            )]
                        },
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::CompleteWithdrawal {
                withdrawal_id,
                transfer_id,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        withdrawal::complete_withdrawal(&db, withdrawal_id, &transfer_id),
                        |change| {
                            withdrawal_entries(
                                change,
                                AuditAction::WithdrawalCompleted,
                                withdrawal_id,
                            )
                        },
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::FailWithdrawal {
                withdrawal_id,
                reply,
            } => {
                let result = self
                    .unit(
                        Durability::Critical,
                        withdrawal::fail_withdrawal(&db, withdrawal_id),
                        |change| {
                            withdrawal_entries(change, AuditAction::WithdrawalRefunded, withdrawal_id)
                        },
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::ReferralCode { account_id, reply } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        referral::referral_code(&db, account_id),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::SetGameSetting { key, value, reply } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        settings::set_game_setting(&db, &key, value),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::SetTextSetting { key, value, reply } => {
                let result = self
                    .unit(
                        Durability::Relaxed,
                        settings::set_text_setting(&db, &key, &value),
                        |_| Vec::new(),
                    )
                    .await;
                let _ = reply.send(result);
            }

            Command::Checkpoint { reply } => {
                let _ = reply.send(self.checkpoint(CheckpointMode::Full).await);
            }

            Command::Shutdown { reply } => {
                // Only reachable while draining after the first shutdown
                let _ = reply.send(Err(Error::WriterUnavailable {
                    message: "writer is already shutting down".to_string(),
                }));
            }
        }
    }
}

fn balance_entries(account_id: i64, action: AuditAction, delta: f64) -> Vec<AuditEntry> {
    if delta == 0.0 {
        return Vec::new();
    }
    vec![AuditEntry::new(account_id, action, delta, "direct adjustment")]
}

fn deposit_entries(change: &StatusChange, invoice_id: &str) -> Vec<AuditEntry> {
    let StatusChange::Applied {
        account_id,
        amount,
        referral,
    } = change
    else {
        return Vec::new();
    };

    let mut entries = vec![AuditEntry::new(
        *account_id,
        AuditAction::Deposit,
        *amount,
        invoice_id,
    )];
    if let Some(credit) = referral {
        entries.push(AuditEntry::new(
            credit.referrer_id,
            AuditAction::ReferralBonus,
            credit.bonus,
            format!("referred account {account_id}"),
        ));
    }
    entries
}

fn withdrawal_entries(
    change: &StatusChange,
    action: AuditAction,
    withdrawal_id: i64,
) -> Vec<AuditEntry> {
    match change {
        StatusChange::Applied {
            account_id, amount, ..
        } => vec![AuditEntry::new(
            *account_id,
            action,
            *amount,
            format!("withdrawal {withdrawal_id}"),
        )],
        StatusChange::NoOp { .. } => Vec::new(),
    }
}

/// Cloneable handle for submitting commands to the writer.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<Command>,
    stats: Arc<LedgerStats>,
}

impl WriterHandle {
    async fn call<R>(&self, build: impl FnOnce(oneshot::Sender<Result<R>>) -> Command) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::WriterUnavailable {
                message: "writer mailbox closed".to_string(),
            })?;

        rx.await.map_err(|_| Error::WriterUnavailable {
            message: "writer dropped the reply".to_string(),
        })?
    }

    /// Writer counters
    #[must_use]
    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }

    /// Creates the account on first contact or refreshes its username.
    pub async fn register_account(
        &self,
        account_id: i64,
        username: Option<String>,
        referrer_id: Option<i64>,
    ) -> Result<Committed<Registration>> {
        self.call(|reply| Command::RegisterAccount {
            account_id,
            username,
            referrer_id,
            reply,
        })
        .await
    }

    /// Signed balance change; returns the new balance.
    pub async fn adjust_balance(&self, account_id: i64, delta: f64) -> Result<Committed<f64>> {
        validate_delta(delta)?;
        self.call(|reply| Command::AdjustBalance {
            account_id,
            delta,
            reply,
        })
        .await
    }

    /// Signed referral balance change; returns the new referral balance.
    pub async fn adjust_referral_balance(
        &self,
        account_id: i64,
        delta: f64,
    ) -> Result<Committed<f64>> {
        validate_delta(delta)?;
        self.call(|reply| Command::AdjustReferralBalance {
            account_id,
            delta,
            reply,
        })
        .await
    }

    /// Increments the games-played counter.
    pub async fn record_game(&self, account_id: i64) -> Result<Committed<i64>> {
        self.call(|reply| Command::RecordGame { account_id, reply })
            .await
    }

    /// Redeems a promo code, checking expiry against `now`.
    pub async fn activate_promo(
        &self,
        code: &str,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Committed<Activation>> {
        let code = code.to_string();
        self.call(|reply| Command::ActivatePromo {
            code,
            account_id,
            now,
            reply,
        })
        .await
    }

    /// Creates a promo code.
    pub async fn create_promo(
        &self,
        code: &str,
        reward_amount: f64,
        max_activations: i32,
        expires_at: Option<DateTime<Utc>>,
        created_by: i64,
    ) -> Result<Committed<PromoCodeModel>> {
        account::validate_positive(reward_amount)?;
        let code = code.to_string();
        self.call(|reply| Command::CreatePromo {
            code,
            reward_amount,
            max_activations,
            expires_at,
            created_by,
            reply,
        })
        .await
    }

    /// Deletes a promo code and its activations.
    pub async fn delete_promo(&self, code: &str) -> Result<Committed<()>> {
        let code = code.to_string();
        self.call(|reply| Command::DeletePromo { code, reply }).await
    }

    /// Opens a pending invoice.
    pub async fn create_payment(
        &self,
        account_id: i64,
        invoice_id: &str,
        amount: f64,
    ) -> Result<Committed<PaymentModel>> {
        validate_delta(amount)?;
        let invoice_id = invoice_id.to_string();
        self.call(|reply| Command::CreatePayment {
            account_id,
            invoice_id,
            amount,
            reply,
        })
        .await
    }

    /// Marks an invoice paid; credits once.
    pub async fn mark_paid(&self, invoice_id: &str) -> Result<Committed<StatusChange>> {
        let invoice_id = invoice_id.to_string();
        self.call(|reply| Command::MarkPaid { invoice_id, reply })
            .await
    }

    /// Marks an invoice failed.
    pub async fn mark_failed(&self, invoice_id: &str) -> Result<Committed<StatusChange>> {
        let invoice_id = invoice_id.to_string();
        self.call(|reply| Command::MarkFailed { invoice_id, reply })
            .await
    }

    /// Reserves funds for a withdrawal.
    pub async fn request_withdrawal(
        &self,
        account_id: i64,
        amount: f64,
        wallet_address: &str,
    ) -> Result<Committed<WithdrawalModel>> {
        account::validate_positive(amount)?;
        let wallet_address = wallet_address.to_string();
        self.call(|reply| Command::RequestWithdrawal {
            account_id,
            amount,
            wallet_address,
            reply,
        })
        .await
    }

    /// Marks a withdrawal completed.
    pub async fn complete_withdrawal(
        &self,
        withdrawal_id: i64,
        transfer_id: &str,
    ) -> Result<Committed<StatusChange>> {
        let transfer_id = transfer_id.to_string();
        self.call(|reply| Command::CompleteWithdrawal {
            withdrawal_id,
            transfer_id,
            reply,
        })
        .await
    }

    /// Marks a withdrawal failed and refunds it.
    pub async fn fail_withdrawal(&self, withdrawal_id: i64) -> Result<Committed<StatusChange>> {
        self.call(|reply| Command::FailWithdrawal {
            withdrawal_id,
            reply,
        })
        .await
    }

    /// Returns the account's share code, allocating it on first use.
    pub async fn referral_code(&self, account_id: i64) -> Result<Committed<String>> {
        self.call(|reply| Command::ReferralCode { account_id, reply })
            .await
    }

    /// Upserts a numeric setting.
    pub async fn set_game_setting(&self, key: &str, value: f64) -> Result<Committed<()>> {
        validate_delta(value)?;
        let key = key.to_string();
        self.call(|reply| Command::SetGameSetting { key, value, reply })
            .await
    }

    /// Upserts a text setting.
    pub async fn set_text_setting(&self, key: &str, value: &str) -> Result<Committed<()>> {
        let key = key.to_string();
        let value = value.to_string();
        self.call(|reply| Command::SetTextSetting { key, value, reply })
            .await
    }

    /// Forces a `FULL` checkpoint after every command queued before it.
    pub async fn checkpoint(&self) -> Result<CheckpointReport> {
        self.call(|reply| Command::Checkpoint { reply }).await
    }

    /// Drains the queue, truncates the WAL and stops the writer.
    pub async fn shutdown(&self) -> Result<CheckpointReport> {
        self.call(|reply| Command::Shutdown { reply }).await
    }
}

/// Spawns the writer actor on `db`, which must be the writer connection.
pub fn spawn_writer(db: DatabaseConnection, config: &LedgerConfig) -> (WriterHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(config.writer_queue_capacity.max(1));
    let stats = Arc::new(LedgerStats::default());
    let writer = LedgerWriter {
        db,
        mailbox,
        config: config.clone(),
        durability: DurabilityController::new(config.relaxed_batch_size),
        stats: Arc::clone(&stats),
    };

    let task = tokio::spawn(writer.run());
    info!(
        "Ledger writer started (queue capacity {})",
        config.writer_queue_capacity
    );
    (WriterHandle { sender, stats }, task)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::config::database::connect;
    use crate::core::audit::recent_entries;
    use crate::core::promo::PromoRejection;
    use crate::migrations::run_migrations;
    use crate::test_utils::setup_test_db;
    use sea_orm::{ConnectionTrait, EntityTrait};

    async fn setup_writer() -> Result<(DatabaseConnection, WriterHandle)> {
        let db = setup_test_db().await?;
        let (handle, _task) = spawn_writer(db.clone(), &LedgerConfig::default());
        Ok((db, handle))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_lose_nothing() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        writer.register_account(1, None, None).await?;
        writer.adjust_balance(1, 100.0).await?;

        let mut tasks = Vec::new();
        for i in 0..75 {
            let writer = writer.clone();
            let delta = if i % 3 == 2 { -1.0 } else { 1.0 };
            tasks.push(tokio::spawn(async move {
                writer.adjust_balance(1, delta).await
            }));
        }
        for task in tasks {
            task.await.unwrap()?;
        }

        let account = account::require_account(&db, 1).await?;
        assert_eq!(account.balance, 125.0);
        assert_eq!(account.total_deposited, 150.0);
        assert_eq!(account.total_spent, 25.0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_promo_respects_limit() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        for id in 1..=10 {
            writer.register_account(id, None, None).await?;
        }
        writer.create_promo("RUSH", 1.0, 3, None, 99).await?;

        let mut tasks = Vec::new();
        for id in 1..=10 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                writer.activate_promo("rush", id, Utc::now()).await
            }));
        }

        let mut granted = 0;
        let mut limited = 0;
        for task in tasks {
            match task.await.unwrap()?.value {
                Activation::Granted { .. } => granted += 1,
                Activation::Rejected(PromoRejection::LimitReached) => limited += 1,
                Activation::Rejected(other) => return Err(Error::InvalidInput {
                    message: format!("unexpected rejection {other}"),
                }),
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(limited, 7);

        let promo = promo::get_promo(&db, "RUSH").await?.unwrap();
        assert_eq!(promo.current_activations, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_paid_twice_credits_once() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        writer.register_account(1, None, None).await?;
        writer.create_payment(1, "inv-7", 3.0).await?;

        let first = writer.mark_paid("inv-7").await?;
        assert!(first.value.is_applied());
        assert_eq!(first.audit, AuditOutcome::Recorded);

        let second = writer.mark_paid("inv-7").await?;
        assert_eq!(second.value, StatusChange::NoOp { account_id: 1 });
        assert_eq!(second.audit, AuditOutcome::Skipped);

        assert_eq!(account::require_account(&db, 1).await?.balance, 3.0);
        let deposits = recent_entries(&db, Some(1), 10).await?;
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].action, "deposit");
        Ok(())
    }

    #[tokio::test]
    async fn test_audit_failure_keeps_mutation() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        writer.register_account(1, None, None).await?;
        db.execute_unprepared("DROP TABLE audit_log").await?;

        let committed = writer.adjust_balance(1, 4.0).await?;
        assert_eq!(committed.value, 4.0);
        assert!(committed.audit_failed());
        assert_eq!(writer.stats().audit_failures(), 1);

        assert_eq!(account::require_account(&db, 1).await?.balance, 4.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_rejected_before_writer() -> Result<()> {
        let (_db, writer) = setup_writer().await?;
        let result = writer.adjust_balance(1, f64::NAN).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        assert_eq!(writer.stats().commands(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_command_is_counted() -> Result<()> {
        let (_db, writer) = setup_writer().await?;
        let result = writer.adjust_balance(5, -1.0).await;
        assert!(matches!(result, Err(Error::AccountNotFound { account_id: 5 })));
        assert_eq!(writer.stats().rejected(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_refuses() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        writer.register_account(1, None, None).await?;

        // Queue work without awaiting it, then shut down behind it
        let pending = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.adjust_balance(1, 2.0).await })
        };
        tokio::task::yield_now().await;
        writer.shutdown().await?;
        pending.await.unwrap()?;

        assert_eq!(account::require_account(&db, 1).await?.balance, 2.0);
        let result = writer.adjust_balance(1, 1.0).await;
        assert!(matches!(result, Err(Error::WriterUnavailable { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_critical_write_survives_crash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let live = dir.path().join("live.sqlite");
        let crashed = dir.path().join("crashed.sqlite");
        let wal_of = |path: &std::path::Path| format!("{}-wal", path.display());

        let handles = connect(&format!("sqlite://{}?mode=rwc", live.display()), 1).await?;
        run_migrations(&handles.writer).await?;
        let config = LedgerConfig {
            // Keep the timer and batch checkpoints out of the way
            checkpoint_interval_secs: 3_600,
            relaxed_batch_size: 10_000,
            ..LedgerConfig::default()
        };
        let (writer, task) = spawn_writer(handles.writer.clone(), &config);
        writer.register_account(1, None, None).await?;
        let committed = writer.adjust_balance(1, 42.0).await?;
        assert_eq!(committed.value, 42.0);

        // Files as a power cut would leave them: connection still open,
        // nothing checkpointed into the main file
        std::fs::copy(&live, &crashed)?;
        std::fs::copy(wal_of(&live), wal_of(&crashed))?;
        assert!(std::fs::metadata(wal_of(&crashed))?.len() > 0);
        task.abort();

        let reopened = connect(&format!("sqlite://{}?mode=rwc", crashed.display()), 1).await?;
        let account = account::require_account(&reopened.reader, 1).await?;
        assert_eq!(account.balance, 42.0);
        assert_eq!(account.total_deposited, 42.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_deposit_leaves_nothing_behind() -> Result<()> {
        let (db, writer) = setup_writer().await?;
        writer.register_account(1, None, None).await?;
        writer.register_account(2, None, Some(1)).await?;
        writer.create_payment(2, "inv-9", 5.0).await?;

        // The referrer vanishes, so the bonus credit fails mid-unit
        crate::entities::Account::delete_by_id(1).exec(&db).await?;

        let result = writer.mark_paid("inv-9").await;
        assert!(matches!(result, Err(Error::AccountNotFound { account_id: 1 })));
        assert_eq!(writer.stats().rejected(), 1);

        let invoice = payment::get_payment(&db, "inv-9").await?.unwrap();
        assert_eq!(invoice.status, crate::entities::PaymentStatus::Pending);
        assert!(invoice.resolved_at.is_none());

        let referred = account::require_account(&db, 2).await?;
        assert_eq!(referred.balance, 0.0);
        assert_eq!(referred.total_deposited, 0.0);
        assert!(!referred.referral_bonus_given);
        assert!(recent_entries(&db, Some(2), 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_command() -> Result<()> {
        let (_db, writer) = setup_writer().await?;
        let report = writer.checkpoint().await?;
        assert!(!report.busy);
        assert!(writer.stats().checkpoints() >= 1);
        Ok(())
    }
}
