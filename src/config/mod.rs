/// Database connection management (writer connection, reader pool, pragmas)
pub mod database;

/// Ledger tuning loaded from config.toml
pub mod ledger;

/// Administrator identifiers from environment variables
pub mod admins;

pub use ledger::LedgerConfig;
