//! Per-user XP totals and the global habit streak.

use serde::{Deserialize, Serialize};

use super::event::{Event, EventKind};
use super::streak::{compute_streak, day_set};
use crate::calendar::DateKey;

/// Derived per-user figures. Always rewritten wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_xp: u64,
    pub current_streak: u32,
    pub last_activity_day: Option<DateKey>,
}

impl AggregateStats {
    pub fn zeroed() -> Self {
        Self::default()
    }
}

/// Recompute a user's stats from every event they own.
///
/// XP sums all events. The streak only looks at habit logs, across all
/// habits combined: any logged habit keeps the day alive.
pub fn compute_aggregate(events: &[Event], today: DateKey) -> AggregateStats {
    let total_xp = events.iter().map(|e| u64::from(e.xp_value)).sum();

    let habit_days = day_set(
        events
            .iter()
            .filter(|e| e.kind.counts_toward_streak())
            .map(|e| e.calendar_day),
        today,
    );

    AggregateStats {
        total_xp,
        current_streak: compute_streak(&habit_days, today),
        last_activity_day: events.iter().map(|e| e.calendar_day).max(),
    }
}

/// One line of XP history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpEntry {
    pub day: DateKey,
    pub xp: u32,
    pub kind: EventKind,
    pub subject_id: String,
    /// Habit name, or the challenge id for challenge completions.
    pub source_name: String,
}

/// XP earned per event, newest first, optionally limited to an inclusive range.
pub fn xp_history<F>(
    events: &[Event],
    from: Option<DateKey>,
    to: Option<DateKey>,
    name_of: F,
) -> Vec<XpEntry>
where
    F: Fn(&Event) -> String,
{
    let mut entries: Vec<XpEntry> = events
        .iter()
        .filter(|e| from.map_or(true, |f| e.calendar_day >= f))
        .filter(|e| to.map_or(true, |t| e.calendar_day <= t))
        .map(|e| XpEntry {
            day: e.calendar_day,
            xp: e.xp_value,
            kind: e.kind,
            subject_id: e.subject_id.clone(),
            source_name: name_of(e),
        })
        .collect();
    entries.sort_by(|a, b| {
        b.day
            .cmp(&a.day)
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    entries
}
