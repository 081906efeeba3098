//! SQLite-backed job store: connection, schema, timestamp helpers.
//!
//! Job CRUD and queue operations live in `jobs`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `~/.local/state/fetchq/jobs.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.get_state_home().join("jobs.db"))
}

/// Handle to the job store. Cheap to clone (shared pool).
///
/// The default database lives under the XDG state directory:
/// `~/.local/state/fetchq/jobs.db`.
#[derive(Clone)]
pub struct JobDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl JobDb {
    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let db = JobDb { pool };
        db.migrate().await?;
        tracing::debug!(path = %path.display(), "job store opened");
        Ok(db)
    }

    /// In-memory database on a single connection (tests, dry runs).
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = JobDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // `seq` gives FIFO order within a priority; `job_id` is the public key.
        // Results are one row per item index and are never updated once written.
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                items_json TEXT NOT NULL,
                total_items INTEGER NOT NULL,
                metadata_json TEXT,
                current_file TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                cancel_reason TEXT,
                lease_holder TEXT,
                lease_expires_ms INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS jobs_queue_idx
                ON jobs (status, priority DESC, seq ASC)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS jobs_owner_idx
                ON jobs (owner_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS job_results (
                job_id TEXT NOT NULL,
                item_index INTEGER NOT NULL,
                status TEXT NOT NULL,
                filepath TEXT,
                size INTEGER,
                checksum TEXT,
                error TEXT,
                attempts INTEGER NOT NULL,
                completed_at INTEGER NOT NULL,
                PRIMARY KEY (job_id, item_index)
            )
            "#,
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Current time as Unix milliseconds (for lease deadlines).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
