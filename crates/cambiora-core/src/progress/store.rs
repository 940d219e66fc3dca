//! Interfaces to the stores the engine reads from and writes to.
//!
//! The engine owns no durability. Implementations are expected to be
//! transactional; [`DerivedStateStore::commit`] in particular must apply a
//! whole [`DerivedWrite`] or nothing.

use super::event::{Event, Subject};
use super::milestone::{MilestoneDefinition, MilestoneTrackProgress};
use super::xp::AggregateStats;
use crate::calendar::DateKey;
use crate::error::DatabaseError;

/// Durable log of activity events.
pub trait EventStore: Send + Sync {
    /// Insert one event. Must fail with [`DatabaseError::UniqueViolation`]
    /// if the subject already has an event on that day.
    fn insert_event(&self, event: &Event) -> Result<(), DatabaseError>;

    /// Delete the event for `(subject, day)`. Returns whether a row existed.
    fn delete_event(&self, user_id: &str, subject_id: &str, day: DateKey) -> Result<bool, DatabaseError>;

    fn list_subject_events(&self, user_id: &str, subject_id: &str) -> Result<Vec<Event>, DatabaseError>;

    fn list_user_events(&self, user_id: &str) -> Result<Vec<Event>, DatabaseError>;

    /// Returns the number of deleted rows.
    fn delete_subject_events(&self, user_id: &str, subject_id: &str) -> Result<usize, DatabaseError>;

    /// Returns the number of deleted rows.
    fn delete_user_events(&self, user_id: &str) -> Result<usize, DatabaseError>;
}

/// Read-mostly milestone catalog.
pub trait CatalogStore: Send + Sync {
    fn list_milestones_ordered(&self) -> Result<Vec<MilestoneDefinition>, DatabaseError>;
}

/// Tracked habits.
pub trait SubjectStore: Send + Sync {
    fn insert_subject(&self, subject: &Subject) -> Result<(), DatabaseError>;

    /// Returns whether a row existed.
    fn set_subject_active(&self, user_id: &str, subject_id: &str, active: bool) -> Result<bool, DatabaseError>;

    fn get_subject(&self, user_id: &str, subject_id: &str) -> Result<Option<Subject>, DatabaseError>;

    fn list_subjects(&self, user_id: &str) -> Result<Vec<Subject>, DatabaseError>;

    /// Returns whether a row existed.
    fn delete_subject(&self, user_id: &str, subject_id: &str) -> Result<bool, DatabaseError>;
}

/// How a commit changes the stored milestone tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackWrite {
    /// Leave tracks untouched.
    Keep,
    /// Replace every track row of the subject with these.
    Replace {
        subject_id: String,
        tracks: Vec<MilestoneTrackProgress>,
    },
    /// Drop every track row of the subject.
    Remove { subject_id: String },
    /// Drop every track row of the user.
    RemoveAll,
}

/// One atomic write of derived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedWrite {
    pub user_id: String,
    pub stats: AggregateStats,
    pub tracks: TrackWrite,
}

/// Cached derived views.
pub trait DerivedStateStore: Send + Sync {
    fn read_aggregate_stats(&self, user_id: &str) -> Result<Option<AggregateStats>, DatabaseError>;

    /// The subject's tracks ordered by position; empty if never reconciled.
    fn read_milestone_tracks(&self, user_id: &str, subject_id: &str) -> Result<Vec<MilestoneTrackProgress>, DatabaseError>;

    /// Every track of every subject of the user.
    fn read_user_tracks(&self, user_id: &str) -> Result<Vec<MilestoneTrackProgress>, DatabaseError>;

    /// Apply stats and track changes in a single transaction.
    fn commit(&self, write: &DerivedWrite) -> Result<(), DatabaseError>;
}

/// Everything the engine needs from persistence.
pub trait ProgressStore: EventStore + CatalogStore + SubjectStore + DerivedStateStore {}

impl<T> ProgressStore for T where T: EventStore + CatalogStore + SubjectStore + DerivedStateStore {}
