//! Calendar-day keys anchored to one configured timezone.
//!
//! Every event counts toward a calendar day rather than a timestamp. The day
//! is computed in a single fixed offset so that callers in different zones
//! agree on what "today" is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default offset: US Eastern standard time.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -5 * 60;

/// A calendar day, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The day before this one.
    pub fn pred(&self) -> Self {
        Self(self.0.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN))
    }

    /// The day after this one.
    pub fn succ(&self) -> Self {
        Self(self.0.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX))
    }

    /// The day `n` days after this one.
    pub fn add_days(&self, n: u32) -> Self {
        Self(
            self.0
                .checked_add_days(Days::new(u64::from(n)))
                .unwrap_or(NaiveDate::MAX),
        )
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| ValidationError::InvalidValue {
                field: "date".to_string(),
                message: format!("'{s}' is not YYYY-MM-DD: {e}"),
            })
    }
}

/// Converts wall-clock instants into [`DateKey`]s in a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarKey {
    offset: FixedOffset,
}

impl CalendarKey {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Build from an offset in minutes east of UTC.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ValidationError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "calendar.utc_offset_minutes".to_string(),
                message: format!("{minutes} is outside -1439..=1439"),
            })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day containing `now` in the configured zone.
    pub fn today_at(&self, now: DateTime<Utc>) -> DateKey {
        DateKey(now.with_timezone(&self.offset).date_naive())
    }

    pub fn today(&self) -> DateKey {
        self.today_at(Utc::now())
    }

    pub fn day_before(&self, day: DateKey) -> DateKey {
        day.pred()
    }
}

impl Default for CalendarKey {
    fn default() -> Self {
        FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60)
            .map(Self::new)
            .unwrap_or_else(|| Self::new(Utc.fix()))
    }
}
