//! # Cambiora Core Library
//!
//! Core logic for the Cambiora habit tracker. Every user-visible number
//! (total XP, current streak, milestone progress) is derived state: it is
//! recomputed from the activity log after each mutation and written back
//! in one transaction, so deleting or re-logging an event always leaves the
//! caches consistent with the log.
//!
//! ## Architecture
//!
//! - **Calendar**: maps instants to calendar days in a fixed UTC offset
//! - **Progress**: pure streak and XP calculators, the milestone track state
//!   machine and the reconciliation engine that sequences them
//! - **Storage**: SQLite persistence for the log and derived state, plus
//!   TOML-based configuration
//!
//! ## Key Components
//!
//! - [`ProgressEngine`]: user actions and reconciliation
//! - [`Database`]: event, catalog and derived-state persistence
//! - [`Config`]: application configuration management

pub mod calendar;
pub mod error;
pub mod progress;
pub mod storage;

pub use calendar::{CalendarKey, DateKey};
pub use error::{ConfigError, CoreError, DatabaseError, ProgressError, ValidationError};
pub use progress::{
    AggregateStats, CatalogEntryView, ChallengeToggle, DailyChallenge, EngineSettings, Event,
    EventKind, ExhaustionPolicy, MilestoneDefinition, MilestoneStatus, MilestoneTrackProgress,
    ProgressEngine, Reconciliation, Subject, TrackOutcome, Trophy, XpEntry,
};
pub use storage::{Config, Database};
