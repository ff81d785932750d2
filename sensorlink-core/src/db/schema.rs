//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: accounts, images, stats
    r#"
    -- Credentials captured by protocol parsers (append-only)
    CREATE TABLE IF NOT EXISTS accounts (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        username         TEXT NOT NULL,
        password         TEXT NOT NULL,
        info             TEXT NOT NULL,
        proto            TEXT NOT NULL,
        parser           TEXT NOT NULL,
        created_at       DATETIME NOT NULL
    );

    -- Captured images, one row per distinct content hash
    CREATE TABLE IF NOT EXISTS images (
        hash             TEXT PRIMARY KEY,
        filetype         TEXT NOT NULL,
        data             BLOB NOT NULL,
        timestamp        DATETIME NOT NULL,
        count            INTEGER NOT NULL DEFAULT 1
    );

    -- Per-interval protocol counts (append-only, aggregated by reports)
    CREATE TABLE IF NOT EXISTS stats (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        proto            TEXT NOT NULL,
        username         TEXT NOT NULL,
        count            INTEGER NOT NULL,
        timestamp        DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_accounts_identity ON accounts(username, password, info);
    CREATE INDEX IF NOT EXISTS idx_images_timestamp ON images(timestamp DESC);
    CREATE INDEX IF NOT EXISTS idx_stats_proto_ts ON stats(proto, timestamp);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["accounts", "images", "stats"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_image_hash_is_primary_key() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO images (hash, filetype, data, timestamp, count) \
                      VALUES ('abc', 'png', x'00', '2026-01-01T00:00:00Z', 1)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
