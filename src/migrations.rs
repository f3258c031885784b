//! Versioned schema migrations.
//!
//! Each migration is an ordered list of idempotent statements
//! (`CREATE ... IF NOT EXISTS`, `INSERT OR IGNORE`). A migration runs inside
//! one transaction together with the row that records it in
//! `schema_migrations`, so a crash mid-migration leaves the previous version
//! in place and the next startup simply runs it again.
//!
//! Shipped versions are frozen: tables are spelled out column by column
//! rather than derived from the entity structs, so editing an entity never
//! changes what an old version creates. Schema changes get a new version.

use crate::core::settings::DEFAULT_GAME_SETTINGS;
use crate::entities::{SchemaMigration, schema_migration};
use crate::errors::Result;
use chrono::Utc;
use sea_orm::sea_query::{
    Alias, ColumnDef, ForeignKey, ForeignKeyCreateStatement, Index, IndexCreateStatement, Table,
    TableCreateStatement,
};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryOrder,
    Set, Statement, TransactionTrait,
};
use tracing::{debug, info, instrument};

/// One schema version.
pub struct Migration {
    /// Monotonic version number, starting at 1
    pub version: i32,
    /// Short description recorded alongside the version
    pub name: &'static str,
    statements: fn(DbBackend) -> Vec<Statement>,
}

impl Migration {
    /// Statements this migration executes, in order.
    #[must_use]
    pub fn statements(&self, backend: DbBackend) -> Vec<Statement> {
        (self.statements)(backend)
    }
}

/// Every migration the ledger knows, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_ledger_tables",
        statements: ledger_tables,
    },
    Migration {
        version: 2,
        name: "create_settings_tables",
        statements: settings_tables,
    },
    Migration {
        version: 3,
        name: "create_referral_codes",
        statements: referral_codes,
    },
    Migration {
        version: 4,
        name: "add_ledger_indexes",
        statements: ledger_indexes,
    },
];

/// Highest version known to this build.
#[must_use]
pub fn latest_version() -> i32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

fn create_table(backend: DbBackend, mut table: TableCreateStatement) -> Statement {
    table.if_not_exists();
    backend.build(&table)
}

fn create_index(backend: DbBackend, index: &IndexCreateStatement) -> Statement {
    backend.build(index)
}

fn col(name: &'static str) -> ColumnDef {
    ColumnDef::new(Alias::new(name))
}

fn references_account(table: &'static str) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(format!("fk_{table}_account"))
        .from(Alias::new(table), Alias::new("account_id"))
        .to(Alias::new("accounts"), Alias::new("id"))
        .to_owned()
}

fn schema_migrations_table() -> TableCreateStatement {
    Table::create()
        .table(Alias::new("schema_migrations"))
        .col(col("version").integer().not_null().primary_key())
        .col(col("name").string().not_null())
        .col(col("applied_at").timestamp_with_time_zone().not_null())
        .to_owned()
}

fn ledger_tables(backend: DbBackend) -> Vec<Statement> {
    let accounts = Table::create()
        .table(Alias::new("accounts"))
        .col(col("id").big_integer().not_null().primary_key())
        .col(col("username").string().null())
        .col(col("balance").double().not_null())
        .col(col("referral_balance").double().not_null())
        .col(col("total_deposited").double().not_null())
        .col(col("total_spent").double().not_null())
        .col(col("games_played").big_integer().not_null())
        .col(col("referral_count").big_integer().not_null())
        .col(col("active_referrals_count").big_integer().not_null())
        .col(col("referrer_id").big_integer().null())
        .col(col("referral_bonus_given").boolean().not_null())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .to_owned();

    let payments = Table::create()
        .table(Alias::new("payments"))
        .col(col("invoice_id").string().not_null().primary_key())
        .col(col("account_id").big_integer().not_null())
        .col(col("amount").double().not_null())
        .col(col("status").text().not_null())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .col(col("resolved_at").timestamp_with_time_zone().null())
        .foreign_key(&mut references_account("payments"))
        .to_owned();

    let withdrawals = Table::create()
        .table(Alias::new("withdrawals"))
        .col(col("id").integer().not_null().auto_increment().primary_key())
        .col(col("account_id").big_integer().not_null())
        .col(col("amount").double().not_null())
        .col(col("wallet_address").string().not_null())
        .col(col("transfer_id").string().null())
        .col(col("status").text().not_null())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .foreign_key(&mut references_account("withdrawals"))
        .to_owned();

    let promo_codes = Table::create()
        .table(Alias::new("promo_codes"))
        .col(col("code").string().not_null().primary_key())
        .col(col("reward_amount").double().not_null())
        .col(col("max_activations").integer().not_null())
        .col(col("current_activations").integer().not_null())
        .col(col("expires_at").timestamp_with_time_zone().null())
        .col(col("created_by").big_integer().not_null())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .to_owned();

    let promo_activations = Table::create()
        .table(Alias::new("promo_activations"))
        .col(col("promo_code").string().not_null())
        .col(col("account_id").big_integer().not_null())
        .col(col("activated_at").timestamp_with_time_zone().not_null())
        .primary_key(
            Index::create()
                .col(Alias::new("promo_code"))
                .col(Alias::new("account_id")),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_promo_activations_code")
                .from(Alias::new("promo_activations"), Alias::new("promo_code"))
                .to(Alias::new("promo_codes"), Alias::new("code")),
        )
        .foreign_key(&mut references_account("promo_activations"))
        .to_owned();

    let audit_log = Table::create()
        .table(Alias::new("audit_log"))
        .col(col("id").integer().not_null().auto_increment().primary_key())
        .col(col("account_id").big_integer().not_null())
        .col(col("action").string().not_null())
        .col(col("amount").double().not_null())
        .col(col("reason").string().not_null())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .to_owned();

    vec![
        create_table(backend, accounts),
        create_table(backend, payments),
        create_table(backend, withdrawals),
        create_table(backend, promo_codes),
        create_table(backend, promo_activations),
        create_table(backend, audit_log),
    ]
}

fn settings_tables(backend: DbBackend) -> Vec<Statement> {
    let game_settings = Table::create()
        .table(Alias::new("game_settings"))
        .col(col("key").string().not_null().primary_key())
        .col(col("value").double().not_null())
        .col(col("updated_at").timestamp_with_time_zone().not_null())
        .to_owned();
    let text_settings = Table::create()
        .table(Alias::new("text_settings"))
        .col(col("key").string().not_null().primary_key())
        .col(col("value").string().not_null())
        .col(col("updated_at").timestamp_with_time_zone().not_null())
        .to_owned();
    let mut statements = vec![
        create_table(backend, game_settings),
        create_table(backend, text_settings),
    ];

    let now = Utc::now();
    for (key, value) in DEFAULT_GAME_SETTINGS {
        statements.push(Statement::from_sql_and_values(
            backend,
            "INSERT OR IGNORE INTO game_settings (key, value, updated_at) VALUES (?, ?, ?)",
            [(*key).into(), (*value).into(), now.into()],
        ));
    }
    statements
}

fn referral_codes(backend: DbBackend) -> Vec<Statement> {
    let referral_codes = Table::create()
        .table(Alias::new("referral_codes"))
        .col(col("account_id").big_integer().not_null().primary_key())
        .col(col("short_code").string().not_null().unique_key())
        .col(col("created_at").timestamp_with_time_zone().not_null())
        .foreign_key(&mut references_account("referral_codes"))
        .to_owned();
    vec![create_table(backend, referral_codes)]
}

fn index(
    name: &'static str,
    table: &'static str,
    columns: &[&'static str],
) -> IndexCreateStatement {
    let mut index = Index::create();
    index.if_not_exists().name(name).table(Alias::new(table));
    for column in columns {
        index.col(Alias::new(*column));
    }
    index
}

fn ledger_indexes(backend: DbBackend) -> Vec<Statement> {
    [
        index(
            "idx_payments_account_status",
            "payments",
            &["account_id", "status"],
        ),
        index("idx_withdrawals_account", "withdrawals", &["account_id"]),
        index("idx_audit_log_account", "audit_log", &["account_id"]),
        index("idx_accounts_referrer", "accounts", &["referrer_id"]),
    ]
    .iter()
    .map(|i| create_index(backend, i))
    .collect()
}

/// Returns the highest applied schema version, 0 for a fresh database.
pub async fn current_version<C>(db: &C) -> Result<i32>
where
    C: ConnectionTrait,
{
    Ok(SchemaMigration::find()
        .order_by_desc(schema_migration::Column::Version)
        .one(db)
        .await?
        .map_or(0, |m| m.version))
}

/// Applies every migration newer than the recorded version.
///
/// Returns the schema version after the run.
#[instrument(skip(db))]
pub async fn run_migrations(db: &DatabaseConnection) -> Result<i32> {
    let backend = db.get_database_backend();
    db.execute(create_table(backend, schema_migrations_table()))
        .await?;

    let current = current_version(db).await?;
    debug!("Schema at version {}", current);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let txn = db.begin().await?;
        for statement in migration.statements(backend) {
            txn.execute(statement).await?;
        }
        schema_migration::ActiveModel {
            version: Set(migration.version),
            name: Set(migration.name.to_string()),
            applied_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        info!(
            "Applied migration {} ({})",
            migration.version, migration.name
        );
    }

    current_version(db).await
}
