//! Consecutive-day streaks over a set of calendar days.
//!
//! Streaks depend only on the *set* of days. Insertion order, duplicates and
//! previously stored counters never matter, which is what lets every
//! mutation recompute them from scratch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::calendar::DateKey;

/// Normalize raw days into a set, dropping anything after `today`.
pub fn day_set<I>(days: I, today: DateKey) -> BTreeSet<DateKey>
where
    I: IntoIterator<Item = DateKey>,
{
    days.into_iter().filter(|d| *d <= today).collect()
}

/// Current streak ending today or yesterday.
///
/// An unlogged today does not break a streak that reached yesterday; the
/// walk simply starts one day earlier.
pub fn compute_streak(days: &BTreeSet<DateKey>, today: DateKey) -> u32 {
    let mut expected = today;
    if !days.contains(&expected) {
        expected = expected.pred();
    }

    let mut streak = 0;
    while days.contains(&expected) {
        streak += 1;
        let prev = expected.pred();
        if prev == expected {
            break;
        }
        expected = prev;
    }
    streak
}

/// A maximal block of consecutive logged days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRun {
    pub start: DateKey,
    pub end: DateKey,
    pub len: u32,
}

impl StreakRun {
    /// Whether this run is the streak still alive on `today`.
    pub fn is_current(&self, today: DateKey) -> bool {
        self.end == today || self.end == today.pred()
    }

    /// The day on which the run reached `n` days (1-based).
    pub fn nth_day(&self, n: u32) -> DateKey {
        self.start.add_days(n.clamp(1, self.len.max(1)) - 1)
    }
}

/// Split the days up to `today` into runs, oldest first.
pub fn streak_runs(days: &BTreeSet<DateKey>, today: DateKey) -> Vec<StreakRun> {
    let mut runs: Vec<StreakRun> = Vec::new();
    for &day in days.range(..=today) {
        match runs.last_mut() {
            Some(run) if run.end.succ() == day => {
                run.end = day;
                run.len += 1;
            }
            _ => runs.push(StreakRun {
                start: day,
                end: day,
                len: 1,
            }),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    fn set(days: &[&str]) -> BTreeSet<DateKey> {
        days.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn empty_set_has_no_streak() {
        assert_eq!(compute_streak(&BTreeSet::new(), d("2026-05-10")), 0);
    }

    #[test]
    fn single_day_today_is_one() {
        assert_eq!(compute_streak(&set(&["2026-05-10"]), d("2026-05-10")), 1);
    }

    #[test]
    fn three_consecutive_days_ending_today() {
        let days = set(&["2026-05-08", "2026-05-09", "2026-05-10"]);
        assert_eq!(compute_streak(&days, d("2026-05-10")), 3);
    }

    #[test]
    fn gap_breaks_the_streak() {
        // D..D+2 logged, D+3 skipped, D+4 logged.
        let days = set(&["2026-05-08", "2026-05-09", "2026-05-10", "2026-05-12"]);
        assert_eq!(compute_streak(&days, d("2026-05-12")), 1);
    }

    #[test]
    fn yesterday_still_counts_when_today_unlogged() {
        // Logged D+3 but not D+4 (today); D+2 is missing.
        let days = set(&["2026-05-08", "2026-05-09", "2026-05-11"]);
        assert_eq!(compute_streak(&days, d("2026-05-12")), 1);
    }

    #[test]
    fn two_days_ago_is_too_late() {
        let days = set(&["2026-05-09", "2026-05-10"]);
        assert_eq!(compute_streak(&days, d("2026-05-12")), 0);
    }

    #[test]
    fn future_days_are_dropped() {
        let today = d("2026-05-10");
        let days = day_set([d("2026-05-10"), d("2026-05-11"), d("2026-05-09")], today);
        assert_eq!(days.len(), 2);
        assert_eq!(compute_streak(&days, today), 2);
    }

    #[test]
    fn runs_are_split_at_gaps() {
        let days = set(&[
            "2026-04-30",
            "2026-05-01",
            "2026-05-03",
            "2026-05-04",
            "2026-05-05",
        ]);
        let runs = streak_runs(&days, d("2026-05-05"));
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len, 2);
        assert_eq!(runs[0].end, d("2026-05-01"));
        assert!(!runs[0].is_current(d("2026-05-05")));
        assert_eq!(runs[1].len, 3);
        assert!(runs[1].is_current(d("2026-05-05")));
        assert!(runs[1].is_current(d("2026-05-06")));
        assert_eq!(runs[1].nth_day(2), d("2026-05-04"));
    }
}
