//! Weekly period planning
//!
//! A calendar year is cut into contiguous, non-overlapping periods. Every
//! Monday closes the running period; the day after starts the next one. The
//! remainder after the last Monday forms a final, possibly shorter, period
//! ending on December 31.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One unit of work: a single week-shaped period of a single year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeeklyUnit {
    /// Calendar year the period belongs to
    pub year: i32,
    /// Position of the period within its year, starting at 0
    pub index: usize,
    /// Position of the unit across the whole run (year-then-index order)
    pub global_index: usize,
    /// First day of the period (inclusive)
    pub start: NaiveDate,
    /// Last day of the period (inclusive)
    pub end: NaiveDate,
}

impl WeeklyUnit {
    /// Number of days covered by the period
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Short label used in logs and artifact names
    pub fn label(&self) -> String {
        format!("{}_week_{}", self.year, self.index)
    }
}

impl std::fmt::Display for WeeklyUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} week {} ({} .. {})",
            self.year, self.index, self.start, self.end
        )
    }
}

/// Inclusive `(start, end)` periods covering January 1 through December 31.
///
/// Returns an empty list for years chrono cannot represent.
pub fn periods_for_year(year: i32) -> Vec<(NaiveDate, NaiveDate)> {
    let (Some(first), Some(last)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return Vec::new();
    };

    let mut periods = Vec::with_capacity(54);
    let mut start = first;
    let mut day = first;

    while day <= last {
        if day.weekday() == Weekday::Mon {
            periods.push((start, day));
            match day.checked_add_days(Days::new(1)) {
                Some(next) => start = next,
                None => return periods,
            }
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }

    if start <= last {
        periods.push((start, last));
    }

    periods
}

/// Plan every unit for the given years.
///
/// Years are visited in ascending order with duplicates removed, so the
/// global index strictly increases with `(year, index)`.
pub fn plan_units(years: &[i32]) -> Vec<WeeklyUnit> {
    let mut ordered = years.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let mut units = Vec::new();
    for year in ordered {
        for (index, (start, end)) in periods_for_year(year).into_iter().enumerate() {
            units.push(WeeklyUnit {
                year,
                index,
                global_index: units.len(),
                start,
                end,
            });
        }
    }
    units
}

/// Recompute a single unit from its year and per-year index.
pub fn unit_for(year: i32, index: usize) -> Option<(NaiveDate, NaiveDate)> {
    periods_for_year(year).get(index).copied()
}
