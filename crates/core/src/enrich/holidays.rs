//! Public holiday calendars
//!
//! Holidays are computed from fixed rules, so the calendar needs no network
//! access. Fixed-date holidays falling on a weekend are also observed on the
//! nearest weekday (Saturday moves to Friday, Sunday moves to Monday).

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A supported holiday jurisdiction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    /// United States federal holidays
    UnitedStates,
    /// United States federal holidays plus New York State holidays
    NewYork,
}

impl Jurisdiction {
    /// Resolve a country code and optional subdivision code
    pub fn from_codes(country: &str, subdivision: Option<&str>) -> Result<Self, String> {
        let country = country.trim().to_ascii_uppercase();
        let subdivision = subdivision
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty());

        match (country.as_str(), subdivision.as_deref()) {
            ("US", None) => Ok(Self::UnitedStates),
            ("US", Some("NY")) => Ok(Self::NewYork),
            ("US", Some(other)) => Err(format!("Unsupported US subdivision '{other}'")),
            (other, _) => Err(format!("Unsupported holiday country '{other}'")),
        }
    }
}

impl FromStr for Jurisdiction {
    type Err = String;

    /// Parses `US` or `US-NY`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((country, subdivision)) => Self::from_codes(country, Some(subdivision)),
            None => Self::from_codes(s, None),
        }
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnitedStates => write!(f, "US"),
            Self::NewYork => write!(f, "US-NY"),
        }
    }
}

/// Holiday dates for a jurisdiction over a set of years
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Build the calendar for exactly the given years
    pub fn new(jurisdiction: Jurisdiction, years: impl IntoIterator<Item = i32>) -> Self {
        let mut dates = BTreeSet::new();
        for year in years {
            dates.extend(
                holidays_for_year(jurisdiction, year)
                    .into_iter()
                    .filter(|d| d.year() == year),
            );
        }
        Self { dates }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// All holiday dates associated with `year`, including observed shifts.
///
/// An observed date may spill into the neighbouring year (New Year's Day on a
/// Saturday is observed on December 31); callers filter by year.
fn holidays_for_year(jurisdiction: Jurisdiction, year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::new();

    let fixed = |month: u32, day: u32, days: &mut Vec<NaiveDate>| {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            days.push(date);
            if let Some(observed) = observed(date) {
                days.push(observed);
            }
        }
    };

    fixed(1, 1, &mut days);
    fixed(7, 4, &mut days);
    fixed(11, 11, &mut days);
    fixed(12, 25, &mut days);
    if year >= 2021 {
        fixed(6, 19, &mut days);
    }
    // Next year's New Year's Day can be observed on December 31
    if let Some(next) = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        && let Some(observed) = observed(next)
        && observed.year() == year
    {
        days.push(observed);
    }

    if year >= 1986 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    days.extend(last_weekday(year, 5, Weekday::Mon));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 10, Weekday::Mon, 2));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));

    if jurisdiction == Jurisdiction::NewYork {
        if let Some(lincoln) = NaiveDate::from_ymd_opt(year, 2, 12) {
            days.push(lincoln);
            days.extend(observed(lincoln));
        }
        if year >= 2004 {
            days.extend(NaiveDate::from_ymd_opt(year, 2, 15));
        }
        if year >= 2015 {
            days.extend(election_day(year));
        }
    }

    days
}

/// Weekday on which a weekend holiday is observed
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.pred_opt(),
        Weekday::Sun => date.succ_opt(),
        _ => None,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    (1..=5)
        .rev()
        .find_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
}

/// Tuesday after the first Monday of November
fn election_day(year: i32) -> Option<NaiveDate> {
    nth_weekday(year, 11, Weekday::Mon, 1).and_then(|monday| monday.succ_opt())
}
