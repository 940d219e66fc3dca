//! Database schema migrations for cambiora.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{params, Connection, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Catalog seeded into a fresh database: (id, name, order_index, node_capacity).
pub const DEFAULT_CATALOG: [(&str, &str, i64, u32); 4] = [
    ("bird", "Bird", 1, 7),
    ("fox", "Fox", 2, 14),
    ("deer", "Deer", 3, 21),
    ("whale", "Whale", 4, 30),
];

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: subjects, events, catalog, tracks and the stats cache.
///
/// The UNIQUE key on `events` is what rejects a second log of the same
/// subject on the same calendar day.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS subjects (
            id          TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            xp_per_day  INTEGER NOT NULL DEFAULT 20,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, id)
        );

        CREATE TABLE IF NOT EXISTS events (
            user_id      TEXT NOT NULL,
            subject_id   TEXT NOT NULL,
            kind         TEXT NOT NULL,
            calendar_day TEXT NOT NULL,
            xp_value     INTEGER NOT NULL CHECK (xp_value >= 0),
            created_at   TEXT NOT NULL,
            UNIQUE (user_id, subject_id, calendar_day)
        );

        CREATE TABLE IF NOT EXISTS milestones (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            order_index   INTEGER NOT NULL UNIQUE,
            node_capacity INTEGER NOT NULL CHECK (node_capacity >= 1)
        );

        CREATE TABLE IF NOT EXISTS milestone_tracks (
            user_id       TEXT NOT NULL,
            subject_id    TEXT NOT NULL,
            position      INTEGER NOT NULL,
            milestone_id  TEXT NOT NULL,
            node_index    INTEGER NOT NULL,
            node_capacity INTEGER NOT NULL,
            is_complete   INTEGER NOT NULL,
            completed_on  TEXT,
            completed_at  TEXT,
            PRIMARY KEY (user_id, subject_id, position),
            CHECK (node_index >= 0 AND node_index <= node_capacity)
        );

        CREATE TABLE IF NOT EXISTS aggregate_stats (
            user_id           TEXT PRIMARY KEY,
            total_xp          INTEGER NOT NULL,
            current_streak    INTEGER NOT NULL,
            last_activity_day TEXT,
            updated_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id);
        CREATE INDEX IF NOT EXISTS idx_events_user_day ON events(user_id, calendar_day);
        CREATE INDEX IF NOT EXISTS idx_tracks_user ON milestone_tracks(user_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: seed the default milestone catalog into an empty table.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM milestones", [], |row| row.get(0))?;
    if existing == 0 {
        for (id, name, order_index, capacity) in DEFAULT_CATALOG {
            tx.execute(
                "INSERT INTO milestones (id, name, order_index, node_capacity) VALUES (?1, ?2, ?3, ?4)",
                params![id, name, order_index, capacity],
            )?;
        }
    }

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM milestones", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, DEFAULT_CATALOG.len() as i64);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM milestones", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, DEFAULT_CATALOG.len() as i64);
    }

    #[test]
    fn events_reject_same_subject_same_day() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let insert = "INSERT INTO events (user_id, subject_id, kind, calendar_day, xp_value, created_at)
                      VALUES ('u', 'h', 'habit_log', '2026-01-01', 20, '')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
