//! Progress reconciliation: streaks, XP and milestone tracks derived from
//! the activity log.
//!
//! Leaves first: [`streak`] and [`xp`] are pure functions over events,
//! [`milestone`] is the per-subject track state machine, [`challenge`]
//! derives today's challenges from the habit list, and [`engine`]
//! sequences them after every mutation against the interfaces in [`store`].

pub mod challenge;
pub mod engine;
pub mod event;
pub mod locks;
pub mod milestone;
pub mod store;
pub mod streak;
pub mod xp;

pub use challenge::{daily_challenges, DailyChallenge};
pub use engine::{
    CatalogEntryView, ChallengeToggle, EngineSettings, MilestoneStatus, ProgressEngine,
    Reconciliation, Trophy, DEFAULT_XP_PER_DAY,
};
pub use event::{Event, EventKind, Subject};
pub use locks::KeyedLocks;
pub use milestone::{
    Catalog, ExhaustionPolicy, MilestoneDefinition, MilestoneTrackManager, MilestoneTrackProgress,
    Occupancy, TrackOutcome, TrackPlan,
};
pub use store::{
    CatalogStore, DerivedStateStore, DerivedWrite, EventStore, ProgressStore, SubjectStore,
    TrackWrite,
};
pub use streak::{compute_streak, day_set, streak_runs, StreakRun};
pub use xp::{compute_aggregate, xp_history, AggregateStats, XpEntry};
