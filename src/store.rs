//! SQLite-backed store of leaked password hashes
//!
//! One table, `passwords(sha1 TEXT PRIMARY KEY)`, holding uppercase
//! 40-character SHA-1 hex strings. The lookup service reads the same table
//! with [`Store::contains`].
//!
//! A [`Store`] is shared between workers behind an `Arc`. Each caller checks
//! out its own connection so that concurrent range transactions never share
//! SQLite connection state; connections go back to the pool on drop.

use crate::Error;
use rusqlite::{params, Connection};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS passwords (
    sha1 TEXT PRIMARY KEY
);";

const INSERT_HASH: &str = "INSERT OR IGNORE INTO passwords (sha1) VALUES (?1)";

const CHECK_HASH: &str = "SELECT EXISTS(SELECT 1 FROM passwords WHERE sha1 = ?1)";

/// Persistent set of known-leaked hashes
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl Store {
    /// Open (or create) the database, switch it to WAL and ensure the schema exists
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Self::connect(&path, busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(CREATE_TABLE)?;
        info!("Opened store at {:?} (journal_mode={})", path, mode);

        Ok(Self {
            path,
            busy_timeout,
            idle: Mutex::new(vec![conn]),
        })
    }

    fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take a connection from the pool, opening a new one if none is idle
    pub fn connection(&self) -> Result<PooledConnection<'_>, Error> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                debug!("Opening additional store connection");
                Self::connect(&self.path, self.busy_timeout)?
            }
        };
        Ok(PooledConnection {
            store: self,
            conn: Some(conn),
        })
    }

    /// Insert a single hash outside of any batch. Returns true if it was new.
    pub fn insert(&self, hash: &str) -> Result<bool, Error> {
        let conn = self.connection()?;
        let changed = conn.prepare_cached(INSERT_HASH)?.execute(params![hash])?;
        Ok(changed > 0)
    }

    /// Check whether a hash is present. The key is uppercased before lookup.
    pub fn contains(&self, hash: &str) -> Result<bool, Error> {
        let conn = self.connection()?;
        let exists: bool = conn
            .prepare_cached(CHECK_HASH)?
            .query_row(params![hash.to_ascii_uppercase()], |row| row.get(0))?;
        Ok(exists)
    }

    /// Number of stored hashes
    pub fn count(&self) -> Result<u64, Error> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM passwords", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn release(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

/// A connection checked out of a [`Store`]
pub struct PooledConnection<'a> {
    store: &'a Store,
    conn: Option<Connection>,
}

impl PooledConnection<'_> {
    /// Start a write batch. `BEGIN IMMEDIATE` takes the write lock up front,
    /// so a busy database surfaces here rather than halfway through the rows.
    pub fn begin(&self) -> Result<Batch<'_>, Error> {
        self.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Batch {
            conn: &**self,
            open: true,
        })
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is held until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.store.release(conn);
        }
    }
}

/// An open write transaction. Rolled back on drop unless committed.
pub struct Batch<'c> {
    conn: &'c Connection,
    open: bool,
}

impl Batch<'_> {
    /// Idempotent insert. Returns true if the hash was not already stored.
    pub fn insert(&self, hash: &str) -> Result<bool, Error> {
        let changed = self
            .conn
            .prepare_cached(INSERT_HASH)?
            .execute(params![hash])?;
        Ok(changed > 0)
    }

    /// Commit the batch. A busy failure leaves the transaction open, so the
    /// call may be retried.
    pub fn commit(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), Error> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!("Rollback on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HASH: &str = "5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8";

    fn open_store(dir: &Path) -> Store {
        Store::open(dir.join("passwords.db"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_open_creates_parent_dirs_and_schema() {
        let dir = tempdir().unwrap();
        let store = Store::open(
            dir.path().join("nested/db/passwords.db"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(store.count().unwrap(), 0);

        // Reopening an existing database must not fail on the schema
        drop(store);
        let store = Store::open(
            dir.path().join("nested/db/passwords.db"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        assert!(store.insert(HASH).unwrap());
        assert!(!store.insert(HASH).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_contains_normalises_case() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store.insert(HASH).unwrap();

        assert!(store.contains(HASH).unwrap());
        assert!(store.contains(&HASH.to_lowercase()).unwrap());
        assert!(!store
            .contains("0000000000000000000000000000000000000000")
            .unwrap());
    }

    #[test]
    fn test_batch_commit_makes_rows_visible() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let conn = store.connection().unwrap();
        let mut batch = conn.begin().unwrap();
        assert!(batch.insert("A").unwrap());
        assert!(batch.insert("B").unwrap());
        assert!(!batch.insert("A").unwrap());
        batch.commit().unwrap();
        drop(batch);
        drop(conn);

        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_batch_rolls_back_on_drop() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        {
            let conn = store.connection().unwrap();
            let batch = conn.begin().unwrap();
            batch.insert("A").unwrap();
            batch.insert("B").unwrap();
        }
        assert_eq!(store.count().unwrap(), 0);

        let conn = store.connection().unwrap();
        let batch = conn.begin().unwrap();
        batch.insert("C").unwrap();
        batch.rollback().unwrap();
        drop(conn);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_connections_are_reused() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        let a = store.connection().unwrap();
        let b = store.connection().unwrap();
        drop(a);
        drop(b);
        assert_eq!(store.idle.lock().unwrap().len(), 2);

        let _c = store.connection().unwrap();
        assert_eq!(store.idle.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_second_writer_sees_busy() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("passwords.db"), Duration::ZERO).unwrap();

        let first = store.connection().unwrap();
        let _held = first.begin().unwrap();

        let second = store.connection().unwrap();
        let err = second.begin().err().unwrap();
        assert!(err.is_contention(), "unexpected error: {err}");
    }
}
