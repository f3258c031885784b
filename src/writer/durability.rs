//! Durability controller - tiered flush policy for the writer connection.
//!
//! The database runs in WAL mode. A critical unit of work executes with
//! `synchronous = FULL`, so its commit syncs the WAL before the writer
//! replies. Relaxed work (audit appends, settings, bookkeeping) runs with
//! `synchronous = NORMAL` and is made durable by the next checkpoint:
//!
//! | trigger                         | checkpoint mode |
//! |---------------------------------|-----------------|
//! | `relaxed_batch_size` relaxed commits | `PASSIVE`  |
//! | checkpoint timer                | `FULL`          |
//! | shutdown                        | `TRUNCATE`      |

use crate::errors::{Error, Result};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use tracing::{debug, error};

/// How urgently a unit of work must reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Synced before the caller sees success
    Critical,
    /// Synced by a later checkpoint
    Relaxed,
}

impl Durability {
    const fn synchronous(self) -> &'static str {
        match self {
            Self::Critical => "FULL",
            Self::Relaxed => "NORMAL",
        }
    }
}

/// `PRAGMA wal_checkpoint` modes used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Copy what it can without waiting on readers
    Passive,
    /// Wait for readers, then copy the whole WAL
    Full,
    /// Like `Full`, then truncate the WAL file
    Truncate,
}

impl CheckpointMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Passive => "PASSIVE",
            Self::Full => "FULL",
            Self::Truncate => "TRUNCATE",
        }
    }
}

/// Row returned by `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointReport {
    /// A reader or writer prevented completion
    pub busy: bool,
    /// Frames in the WAL (-1 when not in WAL mode)
    pub log_frames: i64,
    /// Frames copied back into the database (-1 when not in WAL mode)
    pub checkpointed_frames: i64,
}

/// Tracks the connection's sync level and pending relaxed commits.
#[derive(Debug)]
pub struct DurabilityController {
    relaxed_batch_size: usize,
    pending_relaxed: usize,
    current: Option<Durability>,
}

impl DurabilityController {
    /// Creates a controller that checkpoints after `relaxed_batch_size`
    /// relaxed commits (at least one).
    #[must_use]
    pub fn new(relaxed_batch_size: usize) -> Self {
        Self {
            relaxed_batch_size: relaxed_batch_size.max(1),
            pending_relaxed: 0,
            current: None,
        }
    }

    /// Relaxed commits not yet covered by a checkpoint
    #[must_use]
    pub const fn pending_relaxed(&self) -> usize {
        self.pending_relaxed
    }

    /// Sets the connection's `synchronous` level for the next unit of work.
    ///
    /// A replaced pool connection falls back to `FULL`, which is never
    /// weaker than what was cached, so the pragma is only reissued on change.
    pub async fn prepare(&mut self, db: &DatabaseConnection, durability: Durability) -> Result<()> {
        if self.current == Some(durability) {
            return Ok(());
        }
        db.execute_unprepared(&format!(
            "PRAGMA synchronous = {}",
            durability.synchronous()
        ))
        .await?;
        self.current = Some(durability);
        Ok(())
    }

    /// Records a committed unit of work, checkpointing when the relaxed
    /// batch is full. Checkpoint failures are logged, not returned: the
    /// work itself already committed.
    pub async fn committed(&mut self, db: &DatabaseConnection, durability: Durability) {
        if durability == Durability::Critical {
            return;
        }
        self.pending_relaxed += 1;
        if self.pending_relaxed >= self.relaxed_batch_size {
            if let Err(e) = self.checkpoint(db, CheckpointMode::Passive).await {
                error!("Batch checkpoint failed: {}", e);
            }
        }
    }

    /// Runs `PRAGMA wal_checkpoint(mode)`.
    pub async fn checkpoint(
        &mut self,
        db: &DatabaseConnection,
        mode: CheckpointMode,
    ) -> Result<CheckpointReport> {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                format!("PRAGMA wal_checkpoint({})", mode.as_str()),
            ))
            .await?
            .ok_or_else(|| Error::Config {
                message: "wal_checkpoint returned no row".to_string(),
            })?;

        let report = CheckpointReport {
            busy: row.try_get::<i32>("", "busy")? != 0,
            log_frames: row.try_get::<i64>("", "log")?,
            checkpointed_frames: row.try_get::<i64>("", "checkpointed")?,
        };
        if !report.busy {
            self.pending_relaxed = 0;
        }
        debug!(
            "Checkpoint {} busy={} log={} checkpointed={}",
            mode.as_str(),
            report.busy,
            report.log_frames,
            report.checkpointed_frames
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::database::connect;
    use sea_orm::Database;

    async fn synchronous(db: &DatabaseConnection) -> Result<i32> {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "PRAGMA synchronous".to_string(),
            ))
            .await?
            .unwrap();
        Ok(row.try_get::<i32>("", "synchronous")?)
    }

    #[tokio::test]
    async fn test_prepare_sets_sync_level() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("sync.sqlite").display());
        let handles = connect(&url, 1).await?;
        let mut controller = DurabilityController::new(4);

        controller.prepare(&handles.writer, Durability::Relaxed).await?;
        assert_eq!(synchronous(&handles.writer).await?, 1);

        controller.prepare(&handles.writer, Durability::Critical).await?;
        assert_eq!(synchronous(&handles.writer).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_threshold_resets_counter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("batch.sqlite").display());
        let handles = connect(&url, 1).await?;
        let mut controller = DurabilityController::new(3);

        controller.committed(&handles.writer, Durability::Relaxed).await;
        controller.committed(&handles.writer, Durability::Relaxed).await;
        assert_eq!(controller.pending_relaxed(), 2);

        // Critical commits are already durable and do not count
        controller.committed(&handles.writer, Durability::Critical).await;
        assert_eq!(controller.pending_relaxed(), 2);

        controller.committed(&handles.writer, Durability::Relaxed).await;
        assert_eq!(controller.pending_relaxed(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_on_memory_database() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        let mut controller = DurabilityController::new(1);

        // Not in WAL mode: SQLite reports -1 frames
        let report = controller.checkpoint(&db, CheckpointMode::Truncate).await?;
        assert!(!report.busy);
        assert_eq!(report.log_frames, -1);
        Ok(())
    }
}
