//! SQLite connection setup
//!
//! One [`Database`] backs every SQLite store. Opening it creates the file and
//! its directory when missing and brings the schema up to date.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::debug;

use crate::error::Result;

use super::migrations;

/// Pool size for file databases
const FILE_POOL_SIZE: u32 = 5;

/// How long a writer waits on a lock held by another process, such as a
/// `schedule` run still writing progress
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Migrated connection pool shared by the stores
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    schema_version: i32,
}

impl Database {
    /// Open a database file, creating it and its parent directory if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!(path = %path.display(), "Opening database");
        Self::connect(options, SqlitePoolOptions::new().max_connections(FILE_POOL_SIZE)).await
    }

    /// Private in-memory database
    ///
    /// Every connection to `:memory:` sees its own empty database, so the
    /// pool holds exactly one and never recycles it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::connect(options, pool).await
    }

    async fn connect(options: SqliteConnectOptions, pool: SqlitePoolOptions) -> Result<Self> {
        let options = options.foreign_keys(true).busy_timeout(BUSY_TIMEOUT);
        let pool = pool.connect_with(options).await?;

        migrations::run_migrations(&pool).await?;
        let schema_version = migrations::schema_version(&pool).await?;

        Ok(Self {
            pool,
            schema_version,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version after migrations ran
    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }
}
