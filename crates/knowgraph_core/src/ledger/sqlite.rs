//! File-backed ledger adapter on SQLite.
//!
//! Each ledger key is one row in `ledger_entries`; a single `set` is one
//! UPSERT statement, which gives per-key atomicity and nothing more. Lock
//! contention is bounded by the connection busy timeout and surfaces as
//! `LedgerError::Timeout`.

use super::{Ledger, LedgerError, LedgerResult};
use crate::db::{open_db, open_db_in_memory, DbResult};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Ledger stored in one SQLite database file.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Opens (or creates) the ledger file at `path`.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Self> {
        Ok(Self::from_connection(open_db(path, busy_timeout)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that already has migrations applied.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Ledger for SqliteLedger {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM ledger_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value.unwrap_or_default())
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ledger_entries (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.lock()
            .query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Timeout(value.to_string())
            }
            _ => Self::Transport(value.to_string()),
        }
    }
}
