//! Pooled SQLite connections with scoped release
//!
//! Every store operation borrows a connection for exactly one call. The
//! [`PooledConnection`] guard returns it to the pool when dropped, so a
//! connection is released on every exit path, including `?` and panics.

use crate::error::Result;
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A small pool of idle connections to one database file
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
    busy_timeout: Duration,
}

impl ConnectionPool {
    /// Create a pool for `path`. No connection is opened until first use.
    pub fn new(path: &Path, max_idle: usize, busy_timeout: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle: max_idle.max(1),
            busy_timeout,
        }
    }

    /// Path of the database file behind this pool
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take an idle connection or open a new one
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let conn = match reused {
            Some(conn) => conn,
            None => self.connect()?,
        };

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Number of connections currently parked in the pool
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;

        // WAL lets report readers run while a sensor writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        tracing::trace!(path = %self.path.display(), "Opened database connection");
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        // An open transaction means the caller bailed mid-statement; drop it
        if idle.len() < self.max_idle && conn.is_autocommit() {
            idle.push(conn);
        }
    }
}

/// A connection on loan from a [`ConnectionPool`]
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection is present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(dir: &tempfile::TempDir, max_idle: usize) -> ConnectionPool {
        ConnectionPool::new(
            &dir.path().join("pool.db"),
            max_idle,
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_connection_returned_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 2);
        assert_eq!(pool.idle_count(), 0);

        {
            let conn = pool.acquire().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        // Reuses the parked connection
        let _conn = pool.acquire().unwrap();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_idle_capped() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 1);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_released_after_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 2);

        let failing = || -> Result<()> {
            let conn = pool.acquire()?;
            conn.execute_batch("SELECT * FROM missing_table")?;
            Ok(())
        };
        assert!(failing().is_err());
        assert_eq!(pool.idle_count(), 1);
    }
}
