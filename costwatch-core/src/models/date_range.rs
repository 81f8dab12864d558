//! Inclusive calendar date ranges.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Inclusive range of calendar days, `start <= end`.
///
/// Deserialization goes through [`DateRange::new`], so a reversed range can
/// never be constructed from JSON either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = CoreError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Creates a range, failing when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A single-day range.
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The `n` days ending today (UTC). `n == 0` is treated as 1.
    pub fn last_n_days(n: u32) -> Self {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(n.max(1)) - 1);
        Self { start, end }
    }

    /// First day of the range.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive number of days covered.
    pub fn days(&self) -> u32 {
        let span = (self.end - self.start).num_days() + 1;
        u32::try_from(span).unwrap_or(u32::MAX)
    }

    /// Returns true if `day` falls inside the range.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Splits into contiguous sub-ranges of at most `batch_days` days.
    ///
    /// The sub-ranges cover `start..=end` exactly, in order. A batch size of
    /// zero is treated as one.
    pub fn split(&self, batch_days: u32) -> Vec<DateRange> {
        let step = i64::from(batch_days.max(1));
        let mut ranges = Vec::new();
        let mut cursor = self.start;

        while cursor <= self.end {
            let batch_end = (cursor + Duration::days(step - 1)).min(self.end);
            ranges.push(DateRange {
                start: cursor,
                end: batch_end,
            });
            cursor = batch_end + Duration::days(1);
        }

        ranges
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// ============================================================================
// Tests
// ============================================================================
