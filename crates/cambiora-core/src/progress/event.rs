//! Activity events and the subjects they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::DateKey;

/// What kind of activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A tracked habit was done on the day. Counts toward streaks and XP.
    HabitLog,
    /// A challenge pseudo-subject was completed. Counts toward XP only.
    ChallengeCompletion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::HabitLog => "habit_log",
            EventKind::ChallengeCompletion => "challenge_completion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "habit_log" => Some(EventKind::HabitLog),
            "challenge_completion" => Some(EventKind::ChallengeCompletion),
            _ => None,
        }
    }

    /// Whether events of this kind extend streaks.
    pub fn counts_toward_streak(&self) -> bool {
        match self {
            EventKind::HabitLog => true,
            EventKind::ChallengeCompletion => false,
        }
    }
}

/// One unit of completed activity on one calendar day.
///
/// `xp_value` is captured when the event is created, so a later change to
/// the habit's rate never rewrites history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub user_id: String,
    pub subject_id: String,
    pub calendar_day: DateKey,
    pub kind: EventKind,
    pub xp_value: u32,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn habit_log(
        user_id: impl Into<String>,
        subject_id: impl Into<String>,
        calendar_day: DateKey,
        xp_value: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            subject_id: subject_id.into(),
            calendar_day,
            kind: EventKind::HabitLog,
            xp_value,
            created_at,
        }
    }

    pub fn challenge_completion(
        user_id: impl Into<String>,
        challenge_id: impl Into<String>,
        calendar_day: DateKey,
        xp_value: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            subject_id: challenge_id.into(),
            calendar_day,
            kind: EventKind::ChallengeCompletion,
            xp_value,
            created_at,
        }
    }
}

/// A tracked habit owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub xp_per_day: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_string_mapping_is_stable() {
        for kind in [EventKind::HabitLog, EventKind::ChallengeCompletion] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("habit"), None);
        assert_eq!(
            serde_json::to_string(&EventKind::ChallengeCompletion).unwrap(),
            "\"challenge_completion\""
        );
    }

    #[test]
    fn only_habit_logs_extend_streaks() {
        assert!(EventKind::HabitLog.counts_toward_streak());
        assert!(!EventKind::ChallengeCompletion.counts_toward_streak());
    }
}
