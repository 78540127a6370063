// Miller's Metadata Store
//
// Single-file SQLite database holding files, symbols, identifiers,
// relationships, and the call-reachability closure. WAL journaling with
// foreign keys enforced; every flush writes in one transaction.

pub mod bulk_operations;
pub mod files;
pub mod identifiers;
pub mod reachability;
pub mod relationships;
pub mod schema;
pub mod symbols;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, warn};

pub use identifiers::{AccessKind, FileReferences, ReferenceHit};
pub use reachability::{DeadCodeOptions, HotSpot};
pub use relationships::CrossDirectoryDependency;

/// Storage failure classification per the engine's error contract.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Foreign-key or constraint violation (a bug in the batch being written)
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Database locked by another writer; retried with backoff before surfacing
    #[error("database busy: {0}")]
    Busy(String),
    /// On-disk corruption; fatal to the current operation
    #[error("database corrupt: {0}")]
    Corrupt(String),
    /// Other I/O failure
    #[error("database i/o: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Busy(err.to_string())
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    StoreError::IntegrityViolation(err.to_string())
                }
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
                    StoreError::Corrupt(err.to_string())
                }
                _ => StoreError::Io(err.to_string()),
            },
            _ => StoreError::Io(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Busy retries: 5 attempts, 10ms doubling each time.
const BUSY_RETRY_ATTEMPTS: u32 = 5;
const BUSY_RETRY_BASE_MS: u64 = 10;

/// The metadata store handle. Single writer; reads may share the handle
/// behind the workspace mutex.
pub struct SymbolDatabase {
    pub(crate) conn: Connection,
    #[allow(dead_code)]
    path: PathBuf,
}

impl SymbolDatabase {
    /// Open (or create) the store at `path`. WAL is enabled before the schema
    /// runs so it covers every operation including migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn = Connection::open(&path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let mut db = Self { conn, path };
        db.initialize_schema()?;
        Ok(db)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let mut db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Run `op`, retrying on `Busy` with bounded exponential backoff.
    pub fn retry_busy<T, F>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let mut delay = Duration::from_millis(BUSY_RETRY_BASE_MS);
        let mut last_err: Option<StoreError> = None;

        for attempt in 0..BUSY_RETRY_ATTEMPTS {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let store_err = StoreError::from(e);
                    match store_err {
                        StoreError::Busy(_) => {
                            debug!(
                                "Store busy (attempt {}/{}), backing off {:?}",
                                attempt + 1,
                                BUSY_RETRY_ATTEMPTS,
                                delay
                            );
                            std::thread::sleep(delay);
                            delay *= 2;
                            last_err = Some(store_err);
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| StoreError::Busy("retries exhausted".into())))
    }

    /// Checkpoint the WAL, returning (busy, log, checkpointed) frame counts.
    /// Called on shutdown so the WAL cannot grow without bound across long
    /// server sessions.
    pub fn checkpoint_wal(&self) -> StoreResult<(i32, i32, i32)> {
        let result = self
            .conn
            .prepare("PRAGMA wal_checkpoint(TRUNCATE)")
            .and_then(|mut stmt| {
                stmt.query_row([], |row| {
                    Ok((row.get::<_, i32>(0)?, row.get::<_, i32>(1)?, row.get::<_, i32>(2)?))
                })
            });
        match result {
            Ok(counts) => Ok(counts),
            Err(e) => {
                warn!("WAL checkpoint failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// A small key/value side table for engine state (reachability staleness,
    /// schema version).
    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM index_meta WHERE key = ?1")?;
        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }
}
