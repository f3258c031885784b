//! Database configuration module.
//!
//! The ledger opens two handles on the same `SQLite` file: a single-connection
//! writer that only the writer actor touches, and a small reader pool for
//! query views. In-memory databases cannot be shared between pools, so there
//! both handles are the same single connection.

use crate::errors::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tracing::{debug, info, instrument};

/// Fallback location of the ledger database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/wager_ledger.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Whether the URL points at a private in-memory database.
#[must_use]
pub fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Same database as `url`, opened read-only (`mode=ro`).
#[must_use]
pub fn read_only_url(url: &str) -> String {
    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let mut params: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("mode="))
        .collect();
    params.push("mode=ro");
    format!("{base}?{}", params.join("&"))
}

/// The two connection handles the ledger works with.
#[derive(Debug, Clone)]
pub struct DbHandles {
    /// Single connection reserved for the writer actor
    pub writer: DatabaseConnection,
    /// Pool used by read-only query views
    pub reader: DatabaseConnection,
}

/// Opens the writer connection and the reader pool.
///
/// File databases are switched to WAL so readers never block the writer.
/// The reader pool is opened read-only so a query view can never write.
#[instrument]
pub async fn connect(url: &str, reader_pool_size: u32) -> Result<DbHandles> {
    let mut writer_opts = ConnectOptions::new(url);
    writer_opts
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let writer = Database::connect(writer_opts).await?;

    if is_memory_url(url) {
        debug!("In-memory database: readers share the writer connection");
        return Ok(DbHandles {
            reader: writer.clone(),
            writer,
        });
    }

    writer
        .execute_unprepared("PRAGMA journal_mode = WAL;")
        .await?;
    info!("Writer connection opened in WAL mode");

    let mut reader_opts = ConnectOptions::new(read_only_url(url));
    reader_opts
        .max_connections(reader_pool_size.max(1))
        .min_connections(1)
        .sqlx_logging(false);
    let reader = Database::connect(reader_opts).await?;
    debug!("Reader pool opened with up to {} connections", reader_pool_size);

    Ok(DbHandles { writer, reader })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, Statement};

    #[test]
    fn test_is_memory_url() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://ledger?mode=memory"));
        assert!(!is_memory_url("sqlite://data/ledger.sqlite?mode=rwc"));
    }

    #[tokio::test]
    async fn test_memory_handles_share_connection() -> Result<()> {
        let handles = connect("sqlite::memory:", 4).await?;
        handles
            .writer
            .execute_unprepared("CREATE TABLE scratch (id INTEGER PRIMARY KEY)")
            .await?;

        // The reader must see the table the writer just created
        let row = handles
            .reader
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM scratch",
            ))
            .await?;
        assert!(row.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("wal.sqlite").display()
        );
        let handles = connect(&url, 2).await?;

        let row = handles
            .reader
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "PRAGMA journal_mode",
            ))
            .await?;
        let mode: String = row
            .map(|r| r.try_get::<String>("", "journal_mode"))
            .transpose()?
            .unwrap_or_default();
        assert_eq!(mode.to_lowercase(), "wal");
        Ok(())
    }

    #[test]
    fn test_read_only_url() {
        assert_eq!(
            read_only_url("sqlite://data/ledger.sqlite?mode=rwc"),
            "sqlite://data/ledger.sqlite?mode=ro"
        );
        assert_eq!(
            read_only_url("sqlite://ledger.sqlite?cache=shared&mode=rw"),
            "sqlite://ledger.sqlite?cache=shared&mode=ro"
        );
        assert_eq!(read_only_url("sqlite://ledger.sqlite"), "sqlite://ledger.sqlite?mode=ro");
    }

    #[tokio::test]
    async fn test_reader_pool_cannot_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("ro.sqlite").display()
        );
        let handles = connect(&url, 2).await?;
        handles
            .writer
            .execute_unprepared("CREATE TABLE scratch_rows (id INTEGER PRIMARY KEY)")
            .await?;

        let result = handles
            .reader
            .execute_unprepared("INSERT INTO scratch_rows (id) VALUES (1)")
            .await;
        assert!(result.is_err());

        handles
            .writer
            .execute_unprepared("INSERT INTO scratch_rows (id) VALUES (1)")
            .await?;
        let row = handles
            .reader
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM scratch_rows",
            ))
            .await?;
        let count: i64 = row.map(|r| r.try_get::<i64>("", "n")).transpose()?.unwrap_or_default();
        assert_eq!(count, 1);
        Ok(())
    }
}
