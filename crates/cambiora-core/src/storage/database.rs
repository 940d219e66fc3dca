//! SQLite-backed storage for events, subjects, the milestone catalog and
//! derived state.
//!
//! One [`Database`] implements every store interface the progress engine
//! consumes. The connection sits behind a mutex so a single handle can be
//! shared by request threads.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use crate::calendar::DateKey;
use crate::error::{DatabaseError, Result};
use crate::progress::{
    AggregateStats, CatalogStore, DerivedStateStore, DerivedWrite, Event, EventKind, EventStore,
    MilestoneDefinition, MilestoneTrackProgress, Subject, SubjectStore, TrackWrite,
};

/// SQLite database for progress storage.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/cambiora.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("cambiora.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the milestone catalog wholesale.
    ///
    /// Existing tracks keep their milestone ids; ids that disappear from the
    /// catalog are reassigned on the subject's next reconciliation.
    pub fn replace_catalog(&self, milestones: &[MilestoneDefinition]) -> Result<(), DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM milestones", [])?;
        for m in milestones {
            tx.execute(
                "INSERT INTO milestones (id, name, order_index, node_capacity) VALUES (?1, ?2, ?3, ?4)",
                params![m.id, m.name, m.order_index, m.node_capacity],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of events stored for a user.
    pub fn count_events(&self, user_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateKey> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn opt_day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateKey>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw.parse().map(Some).map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event kind '{0}'")]
struct UnknownKind(String);

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(2)?;
    Ok(Event {
        user_id: row.get(0)?,
        subject_id: row.get(1)?,
        kind: EventKind::parse(&kind).ok_or_else(|| conversion_error(2, UnknownKind(kind.clone())))?,
        calendar_day: day_column(row, 3)?,
        xp_value: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        xp_per_day: row.get(3)?,
        is_active: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<MilestoneTrackProgress> {
    Ok(MilestoneTrackProgress {
        subject_id: row.get(0)?,
        position: row.get(1)?,
        milestone_id: row.get(2)?,
        node_index: row.get(3)?,
        node_capacity: row.get(4)?,
        is_complete: row.get(5)?,
        completed_on: opt_day_column(row, 6)?,
        completed_at: opt_ts_column(row, 7)?,
    })
}

const EVENT_COLUMNS: &str = "user_id, subject_id, kind, calendar_day, xp_value, created_at";
const SUBJECT_COLUMNS: &str = "id, user_id, name, xp_per_day, is_active, created_at";
const TRACK_COLUMNS: &str =
    "subject_id, position, milestone_id, node_index, node_capacity, is_complete, completed_on, completed_at";

impl EventStore for Database {
    fn insert_event(&self, event: &Event) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO events (user_id, subject_id, kind, calendar_day, xp_value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.user_id,
                event.subject_id,
                event.kind.as_str(),
                event.calendar_day.to_string(),
                event.xp_value,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_event(&self, user_id: &str, subject_id: &str, day: DateKey) -> Result<bool, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM events WHERE user_id = ?1 AND subject_id = ?2 AND calendar_day = ?3",
            params![user_id, subject_id, day.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn list_subject_events(&self, user_id: &str, subject_id: &str) -> Result<Vec<Event>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND subject_id = ?2
             ORDER BY calendar_day"
        ))?;
        let rows = stmt.query_map(params![user_id, subject_id], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_user_events(&self, user_id: &str) -> Result<Vec<Event>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1
             ORDER BY calendar_day, subject_id"
        ))?;
        let rows = stmt.query_map(params![user_id], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_subject_events(&self, user_id: &str, subject_id: &str) -> Result<usize, DatabaseError> {
        Ok(self.conn().execute(
            "DELETE FROM events WHERE user_id = ?1 AND subject_id = ?2",
            params![user_id, subject_id],
        )?)
    }

    fn delete_user_events(&self, user_id: &str) -> Result<usize, DatabaseError> {
        Ok(self
            .conn()
            .execute("DELETE FROM events WHERE user_id = ?1", params![user_id])?)
    }
}

impl CatalogStore for Database {
    fn list_milestones_ordered(&self) -> Result<Vec<MilestoneDefinition>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, order_index, node_capacity FROM milestones ORDER BY order_index",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MilestoneDefinition {
                id: row.get(0)?,
                name: row.get(1)?,
                order_index: row.get(2)?,
                node_capacity: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl SubjectStore for Database {
    fn insert_subject(&self, subject: &Subject) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO subjects (id, user_id, name, xp_per_day, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                subject.id,
                subject.user_id,
                subject.name,
                subject.xp_per_day,
                subject.is_active,
                subject.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn set_subject_active(&self, user_id: &str, subject_id: &str, active: bool) -> Result<bool, DatabaseError> {
        let updated = self.conn().execute(
            "UPDATE subjects SET is_active = ?3 WHERE user_id = ?1 AND id = ?2",
            params![user_id, subject_id, active],
        )?;
        Ok(updated > 0)
    }

    fn get_subject(&self, user_id: &str, subject_id: &str) -> Result<Option<Subject>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE user_id = ?1 AND id = ?2"),
                params![user_id, subject_id],
                subject_from_row,
            )
            .optional()?)
    }

    fn list_subjects(&self, user_id: &str) -> Result<Vec<Subject>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params![user_id], subject_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_subject(&self, user_id: &str, subject_id: &str) -> Result<bool, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM subjects WHERE user_id = ?1 AND id = ?2",
            params![user_id, subject_id],
        )?;
        Ok(removed > 0)
    }
}

impl DerivedStateStore for Database {
    fn read_aggregate_stats(&self, user_id: &str) -> Result<Option<AggregateStats>, DatabaseError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT total_xp, current_streak, last_activity_day FROM aggregate_stats WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(AggregateStats {
                        total_xp: row.get(0)?,
                        current_streak: row.get(1)?,
                        last_activity_day: opt_day_column(row, 2)?,
                    })
                },
            )
            .optional()?)
    }

    fn read_milestone_tracks(&self, user_id: &str, subject_id: &str) -> Result<Vec<MilestoneTrackProgress>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM milestone_tracks
             WHERE user_id = ?1 AND subject_id = ?2
             ORDER BY position"
        ))?;
        let rows = stmt.query_map(params![user_id, subject_id], track_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn read_user_tracks(&self, user_id: &str) -> Result<Vec<MilestoneTrackProgress>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM milestone_tracks
             WHERE user_id = ?1
             ORDER BY subject_id, position"
        ))?;
        let rows = stmt.query_map(params![user_id], track_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn commit(&self, write: &DerivedWrite) -> Result<(), DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO aggregate_stats (user_id, total_xp, current_streak, last_activity_day, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                total_xp = excluded.total_xp,
                current_streak = excluded.current_streak,
                last_activity_day = excluded.last_activity_day,
                updated_at = excluded.updated_at",
            params![
                write.user_id,
                write.stats.total_xp,
                write.stats.current_streak,
                write.stats.last_activity_day.map(|d| d.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;

        match &write.tracks {
            TrackWrite::Keep => {}
            TrackWrite::Replace { subject_id, tracks } => {
                tx.execute(
                    "DELETE FROM milestone_tracks WHERE user_id = ?1 AND subject_id = ?2",
                    params![write.user_id, subject_id],
                )?;
                for t in tracks {
                    tx.execute(
                        "INSERT INTO milestone_tracks (user_id, subject_id, position, milestone_id,
                            node_index, node_capacity, is_complete, completed_on, completed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            write.user_id,
                            subject_id,
                            t.position,
                            t.milestone_id,
                            t.node_index,
                            t.node_capacity,
                            t.is_complete,
                            t.completed_on.map(|d| d.to_string()),
                            t.completed_at.map(|at| at.to_rfc3339()),
                        ],
                    )?;
                }
            }
            TrackWrite::Remove { subject_id } => {
                tx.execute(
                    "DELETE FROM milestone_tracks WHERE user_id = ?1 AND subject_id = ?2",
                    params![write.user_id, subject_id],
                )?;
            }
            TrackWrite::RemoveAll => {
                tx.execute(
                    "DELETE FROM milestone_tracks WHERE user_id = ?1",
                    params![write.user_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn insert_and_list_events() {
        let db = Database::open_memory().unwrap();
        db.insert_event(&Event::habit_log("u1", "h1", d("2026-04-01"), 20, at()))
            .unwrap();
        db.insert_event(&Event::challenge_completion("u1", "c1", d("2026-03-31"), 25, at()))
            .unwrap();
        db.insert_event(&Event::habit_log("u2", "h1", d("2026-04-01"), 20, at()))
            .unwrap();

        let events = db.list_user_events("u1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ChallengeCompletion);
        assert_eq!(events[1].created_at, at());
        assert_eq!(db.list_subject_events("u1", "h1").unwrap().len(), 1);
        assert_eq!(db.count_events("u2").unwrap(), 1);
    }

    #[test]
    fn duplicate_day_is_a_unique_violation() {
        let db = Database::open_memory().unwrap();
        let event = Event::habit_log("u1", "h1", d("2026-04-01"), 20, at());
        db.insert_event(&event).unwrap();
        assert!(matches!(
            db.insert_event(&event),
            Err(DatabaseError::UniqueViolation(_))
        ));
    }

    #[test]
    fn delete_event_reports_presence() {
        let db = Database::open_memory().unwrap();
        db.insert_event(&Event::habit_log("u1", "h1", d("2026-04-01"), 20, at()))
            .unwrap();
        assert!(db.delete_event("u1", "h1", d("2026-04-01")).unwrap());
        assert!(!db.delete_event("u1", "h1", d("2026-04-01")).unwrap());
    }

    #[test]
    fn default_catalog_is_ordered() {
        let db = Database::open_memory().unwrap();
        let catalog = db.list_milestones_ordered().unwrap();
        let names: Vec<&str> = catalog.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Bird", "Fox", "Deer", "Whale"]);
    }

    #[test]
    fn replace_catalog_swaps_entries() {
        let db = Database::open_memory().unwrap();
        db.replace_catalog(&[MilestoneDefinition::new("a", "A", 5, 3)])
            .unwrap();
        let catalog = db.list_milestones_ordered().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].node_capacity, 3);
    }

    #[test]
    fn commit_replaces_tracks_and_stats_together() {
        let db = Database::open_memory().unwrap();
        let track = |position: u32, node_index: u32, complete: bool| MilestoneTrackProgress {
            subject_id: "h1".into(),
            position,
            milestone_id: format!("m{position}"),
            node_index,
            node_capacity: 5,
            is_complete: complete,
            completed_on: complete.then(|| d("2026-04-01")),
            completed_at: complete.then(at),
        };

        db.commit(&DerivedWrite {
            user_id: "u1".into(),
            stats: AggregateStats {
                total_xp: 100,
                current_streak: 5,
                last_activity_day: Some(d("2026-04-01")),
            },
            tracks: TrackWrite::Replace {
                subject_id: "h1".into(),
                tracks: vec![track(0, 5, true), track(1, 0, false)],
            },
        })
        .unwrap();
        let stored = db.read_milestone_tracks("u1", "h1").unwrap();
        assert_eq!(stored, vec![track(0, 5, true), track(1, 0, false)]);
        assert_eq!(db.read_aggregate_stats("u1").unwrap().unwrap().total_xp, 100);

        db.commit(&DerivedWrite {
            user_id: "u1".into(),
            stats: AggregateStats::zeroed(),
            tracks: TrackWrite::Replace {
                subject_id: "h1".into(),
                tracks: vec![track(0, 4, false)],
            },
        })
        .unwrap();
        assert_eq!(db.read_milestone_tracks("u1", "h1").unwrap(), vec![track(0, 4, false)]);
        assert_eq!(
            db.read_aggregate_stats("u1").unwrap(),
            Some(AggregateStats::zeroed())
        );
    }

    #[test]
    fn failed_commit_leaves_previous_state() {
        let db = Database::open_memory().unwrap();
        db.commit(&DerivedWrite {
            user_id: "u1".into(),
            stats: AggregateStats {
                total_xp: 10,
                current_streak: 1,
                last_activity_day: None,
            },
            tracks: TrackWrite::Keep,
        })
        .unwrap();

        // node_index above capacity violates the CHECK and aborts the transaction.
        let bad = MilestoneTrackProgress {
            subject_id: "h1".into(),
            position: 0,
            milestone_id: "m".into(),
            node_index: 9,
            node_capacity: 5,
            is_complete: false,
            completed_on: None,
            completed_at: None,
        };
        let result = db.commit(&DerivedWrite {
            user_id: "u1".into(),
            stats: AggregateStats {
                total_xp: 999,
                current_streak: 9,
                last_activity_day: None,
            },
            tracks: TrackWrite::Replace {
                subject_id: "h1".into(),
                tracks: vec![bad],
            },
        });
        assert!(result.is_err());
        assert_eq!(db.read_aggregate_stats("u1").unwrap().unwrap().total_xp, 10);
        assert!(db.read_milestone_tracks("u1", "h1").unwrap().is_empty());
    }

    #[test]
    fn subjects_crud() {
        let db = Database::open_memory().unwrap();
        let subject = Subject {
            id: "h1".into(),
            user_id: "u1".into(),
            name: "Read".into(),
            xp_per_day: 30,
            is_active: true,
            created_at: at(),
        };
        db.insert_subject(&subject).unwrap();
        assert_eq!(db.get_subject("u1", "h1").unwrap(), Some(subject.clone()));
        assert_eq!(db.get_subject("u2", "h1").unwrap(), None);

        assert!(db.set_subject_active("u1", "h1", false).unwrap());
        assert!(!db.get_subject("u1", "h1").unwrap().unwrap().is_active);
        assert!(!db.set_subject_active("u1", "nope", false).unwrap());

        assert_eq!(db.list_subjects("u1").unwrap().len(), 1);
        assert!(db.delete_subject("u1", "h1").unwrap());
        assert!(db.list_subjects("u1").unwrap().is_empty());
    }

    #[test]
    fn open_at_persists_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cambiora.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.insert_event(&Event::habit_log("u1", "h1", d("2026-04-01"), 20, at()))
                .unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.count_events("u1").unwrap(), 1);
    }
}
