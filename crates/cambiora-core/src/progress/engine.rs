//! Reconciliation orchestrator.
//!
//! Every user action that changes the event log ends by calling into this
//! module before it returns, so a client reading stats right afterwards sees
//! post-reconciliation values. Nothing is bumped incrementally: each call
//! fetches the current events, recomputes streak, XP and tracks, and writes
//! them back as one replacement.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::challenge::{daily_challenges, DailyChallenge};
use super::event::{Event, EventKind, Subject};
use super::locks::KeyedLocks;
use super::milestone::{
    Catalog, ExhaustionPolicy, MilestoneDefinition, MilestoneTrackManager, MilestoneTrackProgress,
    Occupancy, TrackOutcome,
};
use super::store::{DerivedWrite, ProgressStore, TrackWrite};
use super::streak::{compute_streak, day_set};
use super::xp::{compute_aggregate, xp_history, AggregateStats, XpEntry};
use crate::calendar::{CalendarKey, DateKey};
use crate::error::{DatabaseError, ProgressError, ValidationError};

/// Default XP a new habit earns per logged day.
pub const DEFAULT_XP_PER_DAY: u32 = 20;

/// Knobs the engine needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub calendar: CalendarKey,
    pub exhaustion: ExhaustionPolicy,
    pub default_xp_per_day: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            calendar: CalendarKey::default(),
            exhaustion: ExhaustionPolicy::default(),
            default_xp_per_day: DEFAULT_XP_PER_DAY,
        }
    }
}

/// Outcome of reconciling one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub stats: AggregateStats,
    pub subject_streak: u32,
    pub track: TrackOutcome,
}

/// Outcome of toggling a challenge completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeToggle {
    pub completed: bool,
    pub stats: AggregateStats,
}

/// A completed milestone, for the trophy shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trophy {
    pub milestone_name: String,
    #[serde(flatten)]
    pub track: MilestoneTrackProgress,
}

/// How a catalog entry stands for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Earned,
    Active,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntryView {
    #[serde(flatten)]
    pub milestone: MilestoneDefinition,
    pub status: MilestoneStatus,
    pub times_earned: u32,
}

/// Sequences streak, XP and milestone recomputation after every mutation.
pub struct ProgressEngine<S> {
    store: S,
    settings: EngineSettings,
    tracks: MilestoneTrackManager,
    /// Per `(user, subject)` writers.
    locks: KeyedLocks,
    /// Per-user stats writers; always taken after a subject lock.
    user_locks: KeyedLocks,
}

impl<S: ProgressStore> ProgressEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store,
            tracks: MilestoneTrackManager::new(settings.exhaustion),
            settings,
            locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn today_at(&self, now: DateTime<Utc>) -> DateKey {
        self.settings.calendar.today_at(now)
    }

    /// Recompute one subject's streak and track plus the user's stats.
    pub fn reconcile(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<Reconciliation, ProgressError> {
        self.locks
            .with_lock(user_id, subject_id, || self.reconcile_locked(user_id, subject_id, now))
    }

    pub fn reconcile_now(&self, user_id: &str, subject_id: &str) -> Result<Reconciliation, ProgressError> {
        self.reconcile(user_id, subject_id, Utc::now())
    }

    /// Reconcile every habit of the user, then the user-level stats.
    pub fn reconcile_all(&self, user_id: &str, now: DateTime<Utc>) -> Result<AggregateStats, ProgressError> {
        for subject in self.store.list_subjects(user_id)? {
            self.reconcile(user_id, &subject.id, now)?;
        }
        self.recompute_user(user_id, now, TrackWrite::Keep)
    }

    /// Caller holds the subject lock. The user-wide stats snapshot is read
    /// and committed under the user lock.
    fn reconcile_locked(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<Reconciliation, ProgressError> {
        self.user_locks.with_lock(user_id, "", || {
            self.reconcile_subject(user_id, subject_id, now)
        })
    }

    fn reconcile_subject(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<Reconciliation, ProgressError> {
        if self.store.get_subject(user_id, subject_id)?.is_none() {
            return Err(ProgressError::NotFound {
                what: format!("habit '{subject_id}'"),
            });
        }

        let today = self.today_at(now);
        let subject_events = self.store.list_subject_events(user_id, subject_id)?;
        let user_events = self.store.list_user_events(user_id)?;

        let days = day_set(
            subject_events
                .iter()
                .filter(|e| e.kind == EventKind::HabitLog)
                .map(|e| e.calendar_day),
            today,
        );
        let subject_streak = compute_streak(&days, today);
        let stats = compute_aggregate(&user_events, today);
        debug!(
            user_id,
            subject_id,
            subject_streak,
            total_xp = stats.total_xp,
            global_streak = stats.current_streak,
            "recomputed progress"
        );

        let catalog = match self.load_catalog() {
            Ok(catalog) => catalog,
            Err(err) => {
                // Streak and XP still land even without a usable catalog.
                warn!(user_id, subject_id, error = %err, "milestone catalog unusable; tracks untouched");
                self.store.commit(&DerivedWrite {
                    user_id: user_id.to_string(),
                    stats,
                    tracks: TrackWrite::Keep,
                })?;
                return Err(err);
            }
        };

        let stored = self.store.read_milestone_tracks(user_id, subject_id)?;
        let user_tracks = self.store.read_user_tracks(user_id)?;
        let occupancy = Occupancy::from_tracks(&user_tracks, subject_id);
        let plan = self
            .tracks
            .transition(&catalog, subject_id, &stored, &occupancy, &days, today, now);

        for milestone_id in &plan.newly_completed {
            info!(user_id, subject_id, milestone_id = %milestone_id, "milestone completed");
        }
        if let TrackOutcome::Exhausted { last_completed } = &plan.outcome {
            warn!(
                user_id,
                subject_id,
                last_completed = %last_completed,
                "milestone catalog exhausted; no active track"
            );
        }

        self.store.commit(&DerivedWrite {
            user_id: user_id.to_string(),
            stats: stats.clone(),
            tracks: TrackWrite::Replace {
                subject_id: subject_id.to_string(),
                tracks: plan.tracks,
            },
        })?;

        Ok(Reconciliation {
            stats,
            subject_streak,
            track: plan.outcome,
        })
    }

    fn recompute_user(&self, user_id: &str, now: DateTime<Utc>, tracks: TrackWrite) -> Result<AggregateStats, ProgressError> {
        self.user_locks.with_lock(user_id, "", || {
            let stats = compute_aggregate(&self.store.list_user_events(user_id)?, self.today_at(now));
            debug!(user_id, total_xp = stats.total_xp, global_streak = stats.current_streak, "recomputed user stats");
            self.store.commit(&DerivedWrite {
                user_id: user_id.to_string(),
                stats: stats.clone(),
                tracks,
            })?;
            Ok(stats)
        })
    }

    fn load_catalog(&self) -> Result<Catalog, ProgressError> {
        Catalog::new(self.store.list_milestones_ordered()?)
    }

    /// Create a habit and give it its first milestone right away.
    ///
    /// Fails before anything is stored when the catalog is unusable.
    pub fn create_habit(
        &self,
        user_id: &str,
        name: &str,
        xp_per_day: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<(Subject, Reconciliation), ProgressError> {
        let subject = Subject {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.trim().to_string(),
            xp_per_day: xp_per_day.unwrap_or(self.settings.default_xp_per_day),
            is_active: true,
            created_at: now,
        };
        self.load_catalog()?;
        self.store.insert_subject(&subject)?;
        info!(user_id, subject_id = %subject.id, name = %subject.name, "habit created");
        let reconciliation = self.reconcile(user_id, &subject.id, now)?;
        Ok((subject, reconciliation))
    }

    /// Log a habit for today and reconcile.
    ///
    /// The event captures the habit's current XP rate. A second log on the
    /// same day is rejected and leaves everything untouched.
    pub fn log_habit(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<Reconciliation, ProgressError> {
        self.locks.with_lock(user_id, subject_id, || {
            let subject = self.require_subject(user_id, subject_id)?;
            if !subject.is_active {
                return Err(ProgressError::InactiveSubject {
                    subject_id: subject_id.to_string(),
                });
            }

            let today = self.today_at(now);
            let event = Event::habit_log(user_id, subject_id, today, subject.xp_per_day, now);
            match self.store.insert_event(&event) {
                Ok(()) => {}
                Err(DatabaseError::UniqueViolation(_)) => {
                    return Err(ProgressError::DuplicateEvent {
                        subject_id: subject_id.to_string(),
                        day: today,
                    })
                }
                Err(err) => return Err(err.into()),
            }

            self.reconcile_locked(user_id, subject_id, now)
        })
    }

    /// Undo today's log. Unlogging a day that was never logged, or a habit
    /// that no longer exists, is a no-op.
    pub fn unlog_habit(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<Reconciliation, ProgressError> {
        self.locks.with_lock(user_id, subject_id, || {
            let today = self.today_at(now);
            if self.store.get_subject(user_id, subject_id)?.is_none() {
                debug!(user_id, subject_id, "unlog of unknown habit");
                let stats = self.recompute_user(user_id, now, TrackWrite::Keep)?;
                return Ok(Reconciliation {
                    stats,
                    subject_streak: 0,
                    track: TrackOutcome::Untracked,
                });
            }
            if !self.store.delete_event(user_id, subject_id, today)? {
                debug!(user_id, subject_id, day = %today, "nothing to unlog");
            }
            self.reconcile_locked(user_id, subject_id, now)
        })
    }

    /// Complete today's challenge, or undo it if already completed.
    pub fn toggle_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        xp: u32,
        now: DateTime<Utc>,
    ) -> Result<ChallengeToggle, ProgressError> {
        self.locks.with_lock(user_id, challenge_id, || {
            self.toggle_challenge_locked(user_id, challenge_id, xp, now)
        })
    }

    /// Toggle one of today's generated challenges, earning its listed XP.
    ///
    /// A completion logged earlier today can still be undone after its habit
    /// was paused or removed.
    pub fn toggle_daily_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChallengeToggle, ProgressError> {
        self.locks.with_lock(user_id, challenge_id, || {
            let offered = self
                .daily_challenges(user_id, now)?
                .into_iter()
                .find(|c| c.id == challenge_id);
            let xp = match offered {
                Some(challenge) => challenge.xp,
                None if self.is_logged_today(user_id, challenge_id, now)? => 0,
                None => {
                    return Err(ProgressError::NotFound {
                        what: format!("challenge '{challenge_id}' for today"),
                    })
                }
            };
            self.toggle_challenge_locked(user_id, challenge_id, xp, now)
        })
    }

    fn toggle_challenge_locked(
        &self,
        user_id: &str,
        challenge_id: &str,
        xp: u32,
        now: DateTime<Utc>,
    ) -> Result<ChallengeToggle, ProgressError> {
        if self.store.get_subject(user_id, challenge_id)?.is_some() {
            return Err(ProgressError::NotFound {
                what: format!("challenge '{challenge_id}' (the id belongs to a habit)"),
            });
        }

        let today = self.today_at(now);
        let completed = if self.store.delete_event(user_id, challenge_id, today)? {
            false
        } else {
            let event = Event::challenge_completion(user_id, challenge_id, today, xp, now);
            match self.store.insert_event(&event) {
                Ok(()) => true,
                Err(DatabaseError::UniqueViolation(_)) => {
                    return Err(ProgressError::DuplicateEvent {
                        subject_id: challenge_id.to_string(),
                        day: today,
                    })
                }
                Err(err) => return Err(err.into()),
            }
        };

        let stats = self.recompute_user(user_id, now, TrackWrite::Keep)?;
        Ok(ChallengeToggle { completed, stats })
    }

    /// Pause or resume a habit. Paused habits keep their history.
    pub fn set_habit_active(&self, user_id: &str, subject_id: &str, active: bool) -> Result<(), ProgressError> {
        if !self.store.set_subject_active(user_id, subject_id, active)? {
            return Err(ProgressError::NotFound {
                what: format!("habit '{subject_id}'"),
            });
        }
        Ok(())
    }

    /// Delete a habit with all its events and tracks, then recompute stats.
    pub fn delete_subject(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<AggregateStats, ProgressError> {
        self.locks.with_lock(user_id, subject_id, || {
            let subject = self.store.get_subject(user_id, subject_id)?;
            let removed_events = self.store.delete_subject_events(user_id, subject_id)?;
            if subject.is_none() && removed_events == 0 {
                return Err(ProgressError::NotFound {
                    what: format!("subject '{subject_id}'"),
                });
            }

            let stats = self.recompute_user(
                user_id,
                now,
                TrackWrite::Remove {
                    subject_id: subject_id.to_string(),
                },
            )?;
            self.store.delete_subject(user_id, subject_id)?;
            info!(user_id, subject_id, removed_events, "subject deleted");
            Ok(stats)
        })
    }

    /// Delete every event and track of the user and zero the stats.
    /// Habits themselves are kept.
    pub fn reset_all(&self, user_id: &str) -> Result<AggregateStats, ProgressError> {
        self.user_locks.with_lock(user_id, "", || {
            let removed_events = self.store.delete_user_events(user_id)?;
            let stats = AggregateStats::zeroed();
            self.store.commit(&DerivedWrite {
                user_id: user_id.to_string(),
                stats: stats.clone(),
                tracks: TrackWrite::RemoveAll,
            })?;
            info!(user_id, removed_events, "progress reset");
            Ok(stats)
        })
    }

    fn require_subject(&self, user_id: &str, subject_id: &str) -> Result<Subject, ProgressError> {
        self.store
            .get_subject(user_id, subject_id)?
            .ok_or_else(|| ProgressError::NotFound {
                what: format!("habit '{subject_id}'"),
            })
    }

    /// Every habit of the user, oldest first.
    pub fn list_habits(&self, user_id: &str) -> Result<Vec<Subject>, ProgressError> {
        Ok(self.store.list_subjects(user_id)?)
    }

    /// Today's challenges, one per active habit, flagged when completed.
    pub fn daily_challenges(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<DailyChallenge>, ProgressError> {
        let today = self.today_at(now);
        let done: HashSet<String> = self
            .store
            .list_user_events(user_id)?
            .into_iter()
            .filter(|e| e.kind == EventKind::ChallengeCompletion && e.calendar_day == today)
            .map(|e| e.subject_id)
            .collect();

        let mut challenges = daily_challenges(&self.store.list_subjects(user_id)?, today);
        for challenge in &mut challenges {
            challenge.completed = done.contains(&challenge.id);
        }
        Ok(challenges)
    }

    /// Cached stats as of the last reconciliation.
    pub fn stats(&self, user_id: &str) -> Result<AggregateStats, ProgressError> {
        Ok(self.store.read_aggregate_stats(user_id)?.unwrap_or_default())
    }

    pub fn subject_streak(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<u32, ProgressError> {
        let today = self.today_at(now);
        let days = day_set(
            self.store
                .list_subject_events(user_id, subject_id)?
                .iter()
                .filter(|e| e.kind == EventKind::HabitLog)
                .map(|e| e.calendar_day),
            today,
        );
        Ok(compute_streak(&days, today))
    }

    pub fn is_logged_today(&self, user_id: &str, subject_id: &str, now: DateTime<Utc>) -> Result<bool, ProgressError> {
        let today = self.today_at(now);
        Ok(self
            .store
            .list_subject_events(user_id, subject_id)?
            .iter()
            .any(|e| e.calendar_day == today))
    }

    /// The subject's active track as last persisted.
    pub fn current_track(&self, user_id: &str, subject_id: &str) -> Result<MilestoneTrackProgress, ProgressError> {
        let tracks = self.store.read_milestone_tracks(user_id, subject_id)?;
        if tracks.is_empty() {
            return Err(ProgressError::NotFound {
                what: format!("milestone track for '{subject_id}'"),
            });
        }
        tracks
            .into_iter()
            .find(|t| !t.is_complete)
            .ok_or_else(|| ProgressError::CatalogExhausted {
                subject_id: subject_id.to_string(),
            })
    }

    /// Every completed milestone of the user, newest first.
    pub fn trophies(&self, user_id: &str) -> Result<Vec<Trophy>, ProgressError> {
        let names: HashMap<String, String> = self
            .store
            .list_milestones_ordered()?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        let mut trophies: Vec<Trophy> = self
            .store
            .read_user_tracks(user_id)?
            .into_iter()
            .filter(|t| t.is_complete)
            .map(|track| Trophy {
                milestone_name: names
                    .get(&track.milestone_id)
                    .cloned()
                    .unwrap_or_else(|| track.milestone_id.clone()),
                track,
            })
            .collect();
        trophies.sort_by(|a, b| {
            b.track
                .completed_on
                .cmp(&a.track.completed_on)
                .then_with(|| b.track.completed_at.cmp(&a.track.completed_at))
                .then_with(|| a.track.subject_id.cmp(&b.track.subject_id))
        });
        Ok(trophies)
    }

    /// The catalog with each entry flagged earned, active or locked.
    pub fn catalog_view(&self, user_id: &str) -> Result<Vec<CatalogEntryView>, ProgressError> {
        let catalog = self.load_catalog()?;
        let tracks = self.store.read_user_tracks(user_id)?;

        Ok(catalog
            .entries()
            .iter()
            .map(|milestone| {
                let mine = tracks.iter().filter(|t| t.milestone_id == milestone.id);
                let times_earned = mine.clone().filter(|t| t.is_complete).count() as u32;
                let status = if times_earned > 0 {
                    MilestoneStatus::Earned
                } else if mine.clone().any(|t| !t.is_complete) {
                    MilestoneStatus::Active
                } else {
                    MilestoneStatus::Locked
                };
                CatalogEntryView {
                    milestone: milestone.clone(),
                    status,
                    times_earned,
                }
            })
            .collect())
    }

    /// XP earned per event, newest first, within an optional inclusive range.
    pub fn xp_history(
        &self,
        user_id: &str,
        from: Option<DateKey>,
        to: Option<DateKey>,
    ) -> crate::error::Result<Vec<XpEntry>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ValidationError::InvalidDateRange { from, to }.into());
            }
        }

        let names: HashMap<String, String> = self
            .store
            .list_subjects(user_id)
            .map_err(ProgressError::from)?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let events = self
            .store
            .list_user_events(user_id)
            .map_err(ProgressError::from)?;

        Ok(xp_history(&events, from, to, |e| match e.kind {
            EventKind::HabitLog => names
                .get(&e.subject_id)
                .cloned()
                .unwrap_or_else(|| e.subject_id.clone()),
            EventKind::ChallengeCompletion => format!("Challenge {}", e.subject_id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn engine() -> ProgressEngine<Database> {
        ProgressEngine::new(Database::open_memory().unwrap(), EngineSettings::default())
    }

    #[test]
    fn today_uses_configured_offset() {
        let engine = engine();
        let just_after_utc_midnight = Utc.with_ymd_and_hms(2026, 1, 2, 2, 0, 0).unwrap();
        assert_eq!(
            engine.today_at(just_after_utc_midnight),
            DateKey::from_ymd(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn list_habits_is_oldest_first() {
        let engine = engine();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let (first, _) = engine.create_habit("u1", "Read", None, t0).unwrap();
        let (second, _) = engine
            .create_habit("u1", "Run", None, t0 + chrono::Duration::minutes(1))
            .unwrap();
        let ids: Vec<String> = engine.list_habits("u1").unwrap().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(engine.list_habits("u2").unwrap().is_empty());
    }

    #[test]
    fn stats_default_to_zero_before_any_reconciliation() {
        assert_eq!(engine().stats("nobody").unwrap(), AggregateStats::zeroed());
    }

    #[test]
    fn current_track_requires_a_reconciled_subject() {
        assert!(matches!(
            engine().current_track("u1", "h1"),
            Err(ProgressError::NotFound { .. })
        ));
    }

    #[test]
    fn settings_drive_default_xp() {
        let settings = EngineSettings {
            default_xp_per_day: 7,
            ..EngineSettings::default()
        };
        let engine = ProgressEngine::new(Database::open_memory().unwrap(), settings);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let (habit, _) = engine.create_habit("u1", "Read", None, now).unwrap();
        assert_eq!(habit.xp_per_day, 7);
        assert_eq!(engine.log_habit("u1", &habit.id, now).unwrap().stats.total_xp, 7);
    }
}
