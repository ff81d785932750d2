//! Database repository layer
//!
//! Row-level statements take a plain `&Connection` so callers can run them
//! inside the transaction opened by [`Database::transaction`]. Read helpers
//! used by reports and tests borrow their own pooled connection.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::types::{AccountRecord, ImageRecord, StatRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;

use super::pool::{ConnectionPool, PooledConnection};

/// Handle to the local SQLite store
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open or create a database at the given path with default pool settings
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &DatabaseConfig::default())
    }

    /// Open or create a database using the pool settings from `config`
    pub fn open_with(path: &Path, config: &DatabaseConfig) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = ConnectionPool::new(path, config.pool_size, config.busy_timeout());

        // Fail at open time, not on the first report
        drop(pool.acquire()?);

        Ok(Self { pool })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.pool.acquire()?;
        super::schema::run_migrations(&conn)
    }

    /// Borrow a connection for the duration of the guard
    pub fn connection(&self) -> Result<PooledConnection<'_>> {
        self.pool.acquire()
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    /// Run `f` in one transaction on a pooled connection.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so concurrent
    /// read-then-write callers queue on the busy timeout instead of failing
    /// when they upgrade. Commits when `f` succeeds. On error the transaction
    /// is rolled back and the connection still goes back to the pool.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.pool.acquire()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ============================================
    // Account operations
    // ============================================

    /// Whether a row with exactly this (username, password, info) exists
    pub fn account_exists(conn: &Connection, account: &AccountRecord) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE username = ?1 AND password = ?2 AND info = ?3",
            params![account.username, account.password, account.info],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Append an account row
    pub fn insert_account(conn: &Connection, account: &AccountRecord) -> Result<i64> {
        conn.execute(
            r#"
            INSERT INTO accounts (username, password, info, proto, parser, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                account.username,
                account.password,
                account.info,
                account.proto,
                account.parser,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Total number of stored accounts
    pub fn count_accounts(&self) -> Result<i64> {
        let conn = self.pool.acquire()?;
        let count = conn.query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0))?;
        Ok(count)
    }

    /// All stored accounts, oldest first
    pub fn list_accounts(&self) -> Result<Vec<AccountRecord>> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(
            "SELECT username, password, info, proto, parser FROM accounts ORDER BY id ASC",
        )?;
        let accounts = stmt
            .query_map([], |row| {
                Ok(AccountRecord {
                    username: row.get("username")?,
                    password: row.get("password")?,
                    info: row.get("info")?,
                    proto: row.get("proto")?,
                    parser: row.get("parser")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    // ============================================
    // Image operations
    // ============================================

    /// Current counter of an image, without loading its bytes
    pub fn find_image_count(conn: &Connection, hash: &str) -> Result<Option<i64>> {
        conn.query_row("SELECT count FROM images WHERE hash = ?1", [hash], |r| {
            r.get(0)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Insert a first sighting with count 1
    pub fn insert_image(
        conn: &Connection,
        hash: &str,
        filetype: &str,
        data: &[u8],
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO images (hash, filetype, data, timestamp, count)
            VALUES (?1, ?2, ?3, ?4, 1)
            "#,
            params![hash, filetype, data, seen_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Refresh the timestamp and bump the counter; returns the new count
    pub fn touch_image(conn: &Connection, hash: &str, seen_at: DateTime<Utc>) -> Result<i64> {
        conn.execute(
            "UPDATE images SET timestamp = ?2, count = count + 1 WHERE hash = ?1",
            params![hash, seen_at.to_rfc3339()],
        )?;
        let count = conn.query_row("SELECT count FROM images WHERE hash = ?1", [hash], |r| {
            r.get(0)
        })?;
        Ok(count)
    }

    /// Get an image by content hash
    pub fn get_image(&self, hash: &str) -> Result<Option<ImageRecord>> {
        let conn = self.pool.acquire()?;
        conn.query_row(
            "SELECT * FROM images WHERE hash = ?1",
            [hash],
            Self::row_to_image,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All images, most recently seen first
    pub fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare("SELECT * FROM images ORDER BY timestamp DESC")?;
        let images = stmt
            .query_map([], Self::row_to_image)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn row_to_image(row: &Row) -> rusqlite::Result<ImageRecord> {
        Ok(ImageRecord {
            hash: row.get("hash")?,
            filetype: row.get("filetype")?,
            data: row.get("data")?,
            last_seen_at: timestamp_column(row, "timestamp")?,
            count: row.get("count")?,
        })
    }

    // ============================================
    // Stat operations
    // ============================================

    /// Append a stat row
    pub fn insert_stat(conn: &Connection, stat: &StatRecord) -> Result<i64> {
        conn.execute(
            r#"
            INSERT INTO stats (proto, username, count, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                stat.proto,
                stat.username,
                stat.count,
                stat.created_at.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Number of stat rows, optionally for one protocol
    pub fn count_stats(&self, proto: Option<&str>) -> Result<i64> {
        let conn = self.pool.acquire()?;
        let count = match proto {
            Some(proto) => conn.query_row(
                "SELECT COUNT(*) FROM stats WHERE proto = ?1",
                [proto],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM stats", [], |r| r.get(0))?,
        };
        Ok(count)
    }

    /// All stat rows, oldest first
    pub fn list_stats(&self) -> Result<Vec<StatRecord>> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn
            .prepare("SELECT proto, username, count, timestamp FROM stats ORDER BY id ASC")?;
        let stats = stmt
            .query_map([], |row| {
                Ok(StatRecord {
                    proto: row.get("proto")?,
                    username: row.get("username")?,
                    count: row.get("count")?,
                    created_at: timestamp_column(row, "timestamp")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }
}

/// Read an RFC 3339 column; a value that does not parse is a conversion error
fn timestamp_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            let index = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("sensor.db")).unwrap();
        db.migrate().unwrap();
        (dir, db)
    }

    fn create_test_account(password: &str) -> AccountRecord {
        AccountRecord::new("bob", password, "ftp login", "ftp", "ftpparser")
    }

    #[test]
    fn test_account_insert_and_exists() {
        let (_dir, db) = open_test_db();
        let account = create_test_account("sec***");

        db.transaction(|tx| {
            assert!(!Database::account_exists(tx, &account)?);
            Database::insert_account(tx, &account)?;
            assert!(Database::account_exists(tx, &account)?);
            Ok(())
        })
        .unwrap();

        let stored = db.list_accounts().unwrap();
        assert_eq!(stored, vec![account]);
    }

    #[test]
    fn test_account_exists_requires_exact_triple() {
        let (_dir, db) = open_test_db();
        let account = create_test_account("sec***");
        db.transaction(|tx| Database::insert_account(tx, &account))
            .unwrap();

        let other_info = AccountRecord {
            info: "ftp login 10.0.0.9".to_string(),
            ..account.clone()
        };
        let found = db
            .transaction(|tx| Database::account_exists(tx, &other_info))
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (_dir, db) = open_test_db();
        let account = create_test_account("sec***");

        let result: Result<()> = db.transaction(|tx| {
            Database::insert_account(tx, &account)?;
            Err(Error::Config("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.count_accounts().unwrap(), 0);
    }

    #[test]
    fn test_image_insert_and_touch() {
        let (_dir, db) = open_test_db();
        let now = Utc::now();

        db.transaction(|tx| Database::insert_image(tx, "deadbeef", "png", b"\x89PNG", now))
            .unwrap();
        let count = db
            .transaction(|tx| Database::touch_image(tx, "deadbeef", Utc::now()))
            .unwrap();
        assert_eq!(count, 2);

        let image = db.get_image("deadbeef").unwrap().unwrap();
        assert_eq!(image.filetype, "png");
        assert_eq!(image.data, b"\x89PNG".to_vec());
        assert_eq!(image.count, 2);
        assert!(db.get_image("cafebabe").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let (_dir, db) = open_test_db();
        db.transaction(|tx| Database::insert_image(tx, "deadbeef", "png", b"\x89PNG", Utc::now()))
            .unwrap();
        db.connection()
            .unwrap()
            .execute("UPDATE images SET timestamp = 'yesterday-ish' WHERE hash = 'deadbeef'", [])
            .unwrap();

        assert!(matches!(
            db.get_image("deadbeef"),
            Err(Error::Database(rusqlite::Error::FromSqlConversionFailure(..)))
        ));
        assert!(db.list_images().is_err());
    }

    #[test]
    fn test_concurrent_image_sightings_all_counted() {
        let (_dir, db) = open_test_db();
        let db = std::sync::Arc::new(db);
        let threads = 8;
        let rounds = 5;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let db = std::sync::Arc::clone(&db);
                std::thread::spawn(move || {
                    for _ in 0..rounds {
                        db.transaction(|tx| match Database::find_image_count(tx, "cafe")? {
                            Some(_) => Database::touch_image(tx, "cafe", Utc::now()).map(|_| ()),
                            None => Database::insert_image(tx, "cafe", "gif", b"GIF89a", Utc::now()),
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let image = db.get_image("cafe").unwrap().unwrap();
        assert_eq!(image.count, (threads * rounds) as i64);
    }

    #[test]
    fn test_stats_counted_per_proto() {
        let (_dir, db) = open_test_db();
        db.transaction(|tx| {
            Database::insert_stat(tx, &StatRecord::new("http", "sensor01", 42))?;
            Database::insert_stat(tx, &StatRecord::new("http", "sensor01", 42))?;
            Database::insert_stat(tx, &StatRecord::new("ftp", "sensor01", 7))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.count_stats(None).unwrap(), 3);
        assert_eq!(db.count_stats(Some("http")).unwrap(), 2);
        assert_eq!(db.list_stats().unwrap()[2].count, 7);
    }
}
