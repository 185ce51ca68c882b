//! Calendar fields derived from a timestamp

use chrono::{Datelike, NaiveDateTime, Timelike};

use super::holidays::HolidayCalendar;
use crate::record::CalendarFields;

/// Derive calendar fields for one instant
pub fn calendar_fields(timestamp: NaiveDateTime, holidays: &HolidayCalendar) -> CalendarFields {
    let day_of_week = timestamp.weekday().num_days_from_monday() as u8;
    CalendarFields {
        hour: timestamp.hour() as u8,
        day_of_week,
        month: timestamp.month() as u8,
        year: u16::try_from(timestamp.year()).unwrap_or(0),
        is_weekend: day_of_week >= 5,
        is_holiday: holidays.is_holiday(timestamp.date()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::holidays::Jurisdiction;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_weekday_fields() {
        let holidays = HolidayCalendar::new(Jurisdiction::NewYork, [2024]);
        // 2024-03-06 is a Wednesday
        let fields = calendar_fields(at(2024, 3, 6, 17), &holidays);
        assert_eq!(fields.hour, 17);
        assert_eq!(fields.day_of_week, 2);
        assert_eq!(fields.month, 3);
        assert_eq!(fields.year, 2024);
        assert!(!fields.is_weekend);
        assert!(!fields.is_holiday);
    }

    #[test]
    fn test_weekend_and_holiday() {
        let holidays = HolidayCalendar::new(Jurisdiction::NewYork, [2024]);
        let sunday = calendar_fields(at(2024, 3, 10, 0), &holidays);
        assert_eq!(sunday.day_of_week, 6);
        assert!(sunday.is_weekend);

        let independence = calendar_fields(at(2024, 7, 4, 12), &holidays);
        assert!(independence.is_holiday);
        assert!(!independence.is_weekend);
    }
}
