//! Weather join and gap filling

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Timelike};

use crate::fetch::HourlyWeather;
use crate::record::WeatherValues;

/// Truncate an instant to the start of its hour
pub fn hour_of(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

/// Resolve weather for every hour in `hours` (ascending, distinct).
///
/// Values come from an exact hour match. Remaining gaps take the nearest
/// earlier known value, then the nearest later known value; a field with no
/// known value at all stays unknown.
pub fn resolve_hours(
    hours: &[NaiveDateTime],
    weather: &HourlyWeather,
) -> BTreeMap<NaiveDateTime, WeatherValues> {
    let mut joined: Vec<WeatherValues> = hours
        .iter()
        .map(|hour| weather.get(hour).copied().unwrap_or_default())
        .collect();

    fill_field(&mut joined, |v| &mut v.temperature_2m);
    fill_field(&mut joined, |v| &mut v.relative_humidity_2m);
    fill_field(&mut joined, |v| &mut v.precipitation);
    fill_field(&mut joined, |v| &mut v.rain);
    fill_field(&mut joined, |v| &mut v.snowfall);
    fill_field(&mut joined, |v| &mut v.weather_code);
    fill_field(&mut joined, |v| &mut v.wind_speed_10m);

    hours.iter().copied().zip(joined).collect()
}

/// Forward fill, then backward fill, one field across a time-ordered series
fn fill_field<T, F>(series: &mut [WeatherValues], field: F)
where
    T: Copy,
    F: Fn(&mut WeatherValues) -> &mut Option<T>,
{
    let mut last = None;
    for values in series.iter_mut() {
        let slot = field(values);
        match *slot {
            Some(v) => last = Some(v),
            None => *slot = last,
        }
    }

    let mut next = None;
    for values in series.iter_mut().rev() {
        let slot = field(values);
        match *slot {
            Some(v) => next = Some(v),
            None => *slot = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn temp(t: f32) -> WeatherValues {
        WeatherValues {
            temperature_2m: Some(t),
            ..Default::default()
        }
    }

    #[test]
    fn test_interior_gap_takes_previous_value() {
        let mut weather = HourlyWeather::default();
        weather.hours.insert(hour(1), temp(1.0));
        weather.hours.insert(hour(3), temp(3.0));

        let resolved = resolve_hours(&[hour(1), hour(2), hour(3)], &weather);
        assert_eq!(resolved[&hour(2)].temperature_2m, Some(1.0));
        assert_eq!(resolved[&hour(3)].temperature_2m, Some(3.0));
    }

    #[test]
    fn test_leading_gap_takes_next_value() {
        let mut weather = HourlyWeather::default();
        weather.hours.insert(hour(5), temp(5.0));

        let resolved = resolve_hours(&[hour(3), hour(4), hour(5), hour(6)], &weather);
        assert_eq!(resolved[&hour(3)].temperature_2m, Some(5.0));
        assert_eq!(resolved[&hour(6)].temperature_2m, Some(5.0));
    }

    #[test]
    fn test_unknown_field_stays_unknown() {
        let mut weather = HourlyWeather::default();
        weather.hours.insert(hour(1), temp(1.0));

        let resolved = resolve_hours(&[hour(1), hour(2)], &weather);
        assert_eq!(resolved[&hour(2)].rain, None);
        assert_eq!(resolved[&hour(2)].weather_code, None);
    }

    #[test]
    fn test_hour_of_truncates() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(7, 42, 13)
            .unwrap();
        assert_eq!(hour_of(t), hour(7));
    }
}
