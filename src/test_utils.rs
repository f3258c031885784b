//! Shared test utilities for the ledger.
//!
//! Helpers for spinning up a migrated in-memory database or a whole
//! [`Ledger`], plus a few entity shortcuts with sensible defaults.

use crate::{
    config::{LedgerConfig, database::connect},
    core::account,
    entities,
    errors::Result,
    ledger::Ledger,
    migrations::run_migrations,
};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with every migration applied.
/// This is the standard setup for core-level tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let handles = connect("sqlite::memory:", 1).await?;
    run_migrations(&handles.writer).await?;
    Ok(handles.writer)
}

/// Opens a full ledger (writer actor included) on an in-memory database.
pub async fn setup_test_ledger() -> Result<Ledger> {
    Ledger::open("sqlite::memory:", LedgerConfig::default()).await
}

/// Registers an account and credits it with `balance`.
///
/// The credit goes through [`account::adjust_balance`], so it also shows up
/// in `total_deposited`.
pub async fn create_funded_account(
    db: &DatabaseConnection,
    account_id: i64,
    balance: f64,
) -> Result<entities::account::Model> {
    account::register_account(db, account_id, Some(format!("user{account_id}")), None).await?;
    if balance > 0.0 {
        account::adjust_balance(db, account_id, balance).await?;
    }
    account::require_account(db, account_id).await
}

/// Routes tracing output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("trace"))
        .with_test_writer()
        .try_init();
}
