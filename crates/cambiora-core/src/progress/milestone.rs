//! Milestone tracks: fixed-size progress bars that roll over on completion.
//!
//! A subject's track history is derived, not accumulated. Given the
//! subject's origin milestone and its logged days, each streak run fills
//! milestones in catalog order; a run that has ended leaves the active
//! milestone empty, while milestones it completed stay completed. Because
//! the history is a function of the day set, logging and unlogging in any
//! order always lands on the same tracks.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::streak::streak_runs;
use crate::calendar::DateKey;
use crate::error::ProgressError;

/// One catalog entry. `node_capacity` streak days fill it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDefinition {
    pub id: String,
    pub name: String,
    pub order_index: i64,
    pub node_capacity: u32,
}

impl MilestoneDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order_index: i64, node_capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order_index,
            node_capacity,
        }
    }
}

/// What to do once the last milestone in the catalog completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Start again from the lowest `order_index`.
    #[default]
    Wrap,
    /// Stop creating tracks for the subject.
    Stop,
}

/// Persisted progress of one subject on one milestone.
///
/// `position` orders a subject's tracks; position 0 is the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTrackProgress {
    pub subject_id: String,
    pub position: u32,
    pub milestone_id: String,
    pub node_index: u32,
    pub node_capacity: u32,
    pub is_complete: bool,
    /// Calendar day the streak filled the milestone.
    pub completed_on: Option<DateKey>,
    /// Reconciliation instant that first observed the completion.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A validated catalog, sorted by `order_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<MilestoneDefinition>,
}

impl Catalog {
    pub fn new(mut entries: Vec<MilestoneDefinition>) -> Result<Self, ProgressError> {
        if entries.is_empty() {
            return Err(ProgressError::EmptyCatalog);
        }
        entries.sort_by_key(|m| m.order_index);

        let mut ids = HashSet::new();
        for (i, m) in entries.iter().enumerate() {
            if m.node_capacity == 0 {
                return Err(ProgressError::InvalidCatalog(format!(
                    "milestone '{}' has zero node capacity",
                    m.id
                )));
            }
            if !ids.insert(m.id.as_str()) {
                return Err(ProgressError::InvalidCatalog(format!(
                    "duplicate milestone id '{}'",
                    m.id
                )));
            }
            if i > 0 && entries[i - 1].order_index == m.order_index {
                return Err(ProgressError::InvalidCatalog(format!(
                    "duplicate order_index {}",
                    m.order_index
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MilestoneDefinition] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MilestoneDefinition> {
        self.entries.get(index)
    }

    pub fn index_of(&self, milestone_id: &str) -> Option<usize> {
        self.entries.iter().position(|m| m.id == milestone_id)
    }

    /// Index of the milestone with the next higher `order_index`.
    pub fn next_after(&self, index: usize, policy: ExhaustionPolicy) -> Option<usize> {
        if index + 1 < self.entries.len() {
            Some(index + 1)
        } else {
            match policy {
                ExhaustionPolicy::Wrap => Some(0),
                ExhaustionPolicy::Stop => None,
            }
        }
    }
}

/// Where the subject's track stands after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackOutcome {
    Active(MilestoneTrackProgress),
    /// Every reachable milestone completed and the policy forbids wrapping.
    Exhausted { last_completed: String },
    /// The subject does not exist, so it has no track.
    Untracked,
}

impl TrackOutcome {
    pub fn active(&self) -> Option<&MilestoneTrackProgress> {
        match self {
            TrackOutcome::Active(track) => Some(track),
            TrackOutcome::Exhausted { .. } | TrackOutcome::Untracked => None,
        }
    }
}

/// Result of one transition: the full replacement track list for a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPlan {
    pub tracks: Vec<MilestoneTrackProgress>,
    pub outcome: TrackOutcome,
    /// Milestones completed for the first time by this transition.
    pub newly_completed: Vec<String>,
}

/// Milestones already spoken for by the user's other subjects.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    /// Milestones some other subject has ever been assigned.
    pub ever_assigned: HashSet<String>,
    /// Milestones currently active for some other subject.
    pub active: HashSet<String>,
}

impl Occupancy {
    /// Build from every stored track of the user, excluding `subject_id`.
    pub fn from_tracks<'a, I>(tracks: I, subject_id: &str) -> Self
    where
        I: IntoIterator<Item = &'a MilestoneTrackProgress>,
    {
        let mut occupancy = Self::default();
        for track in tracks.into_iter().filter(|t| t.subject_id != subject_id) {
            occupancy.ever_assigned.insert(track.milestone_id.clone());
            if !track.is_complete {
                occupancy.active.insert(track.milestone_id.clone());
            }
        }
        occupancy
    }
}

/// Drives the per-subject milestone state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilestoneTrackManager {
    policy: ExhaustionPolicy,
}

impl MilestoneTrackManager {
    pub fn new(policy: ExhaustionPolicy) -> Self {
        Self { policy }
    }

    /// Pick the first milestone for a subject that has none yet.
    ///
    /// Lowest `order_index` nobody else was ever assigned; once every entry
    /// has been used, a slot derived from the subject id, probing forward
    /// past milestones that are active elsewhere.
    pub fn assign_origin(&self, catalog: &Catalog, subject_id: &str, occupancy: &Occupancy) -> usize {
        if let Some(index) = catalog
            .entries()
            .iter()
            .position(|m| !occupancy.ever_assigned.contains(&m.id))
        {
            return index;
        }

        let len = catalog.len();
        let start = (subject_hash(subject_id) % len as u64) as usize;
        (0..len)
            .map(|step| (start + step) % len)
            .find(|&i| {
                catalog
                    .get(i)
                    .is_some_and(|m| !occupancy.active.contains(&m.id))
            })
            .unwrap_or(start)
    }

    /// Recompute a subject's tracks from its logged days.
    ///
    /// `stored` is the subject's current persisted track list; only its
    /// origin and completion stamps are reused, everything else is derived.
    #[allow(clippy::too_many_arguments)]
    pub fn transition(
        &self,
        catalog: &Catalog,
        subject_id: &str,
        stored: &[MilestoneTrackProgress],
        occupancy: &Occupancy,
        days: &BTreeSet<DateKey>,
        today: DateKey,
        now: DateTime<Utc>,
    ) -> TrackPlan {
        let origin = stored
            .iter()
            .find(|t| t.position == 0)
            .and_then(|t| catalog.index_of(&t.milestone_id))
            .unwrap_or_else(|| self.assign_origin(catalog, subject_id, occupancy));

        let mut tracks = Vec::new();
        let mut newly_completed = Vec::new();
        let mut current = Some(origin);
        let mut active_nodes = 0;

        'runs: for run in streak_runs(days, today) {
            let mut remaining = run.len;
            let mut consumed = 0;
            while let Some(index) = current {
                let Some(milestone) = catalog.get(index) else {
                    break 'runs;
                };
                if remaining < milestone.node_capacity {
                    break;
                }
                remaining -= milestone.node_capacity;
                consumed += milestone.node_capacity;

                let position = tracks.len() as u32;
                let previous = stored.iter().find(|t| {
                    t.position == position && t.milestone_id == milestone.id && t.is_complete
                });
                let completed_at = match previous.and_then(|t| t.completed_at) {
                    Some(at) => at,
                    None => {
                        newly_completed.push(milestone.id.clone());
                        now
                    }
                };
                tracks.push(MilestoneTrackProgress {
                    subject_id: subject_id.to_string(),
                    position,
                    milestone_id: milestone.id.clone(),
                    node_index: milestone.node_capacity,
                    node_capacity: milestone.node_capacity,
                    is_complete: true,
                    completed_on: Some(run.nth_day(consumed)),
                    completed_at: Some(completed_at),
                });
                current = catalog.next_after(index, self.policy);
            }
            active_nodes = if run.is_current(today) { remaining } else { 0 };
        }

        let outcome = match current.and_then(|i| catalog.get(i)) {
            Some(milestone) => {
                let active = MilestoneTrackProgress {
                    subject_id: subject_id.to_string(),
                    position: tracks.len() as u32,
                    milestone_id: milestone.id.clone(),
                    node_index: active_nodes.min(milestone.node_capacity),
                    node_capacity: milestone.node_capacity,
                    is_complete: false,
                    completed_on: None,
                    completed_at: None,
                };
                tracks.push(active.clone());
                TrackOutcome::Active(active)
            }
            None => TrackOutcome::Exhausted {
                last_completed: tracks
                    .last()
                    .map(|t| t.milestone_id.clone())
                    .unwrap_or_default(),
            },
        };

        TrackPlan {
            tracks,
            outcome,
            newly_completed,
        }
    }
}

/// Stable 64-bit hash of a subject id.
fn subject_hash(subject_id: &str) -> u64 {
    let digest = Sha256::digest(subject_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
