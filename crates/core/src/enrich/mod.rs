//! Record enrichment
//!
//! Attaches calendar fields, a holiday flag and hourly weather to a batch of
//! ridership records. Weather is the only step that touches the network: one
//! request per batch, spanning the batch's date range. A failed weather
//! request leaves the batch without weather instead of failing it.

mod calendar;
pub mod holidays;
mod weather;

use std::collections::BTreeSet;

use chrono::Datelike;
use tracing::{debug, warn};

pub use calendar::calendar_fields;
pub use holidays::{HolidayCalendar, Jurisdiction};
pub use weather::{hour_of, resolve_hours};

use crate::fetch::{Location, WeatherSource};
use crate::record::{EnrichedBatch, EnrichedRecord, RidershipRecord, WeatherValues};

/// Stateless enrichment step
pub struct Enricher<'a> {
    weather: Option<&'a dyn WeatherSource>,
    location: Location,
    jurisdiction: Jurisdiction,
}

impl<'a> Enricher<'a> {
    pub fn new(jurisdiction: Jurisdiction, location: Location) -> Self {
        Self {
            weather: None,
            location,
            jurisdiction,
        }
    }

    /// Use a weather source for the hourly join
    pub fn with_weather(mut self, source: &'a dyn WeatherSource) -> Self {
        self.weather = Some(source);
        self
    }

    /// Enrich one batch of records, preserving input order
    pub fn enrich(&self, records: Vec<RidershipRecord>) -> EnrichedBatch {
        if records.is_empty() {
            return EnrichedBatch::default();
        }

        let years: BTreeSet<i32> = records
            .iter()
            .map(|r| r.transit_timestamp.year())
            .collect();
        let holidays = HolidayCalendar::new(self.jurisdiction, years.iter().copied());

        let hours: Vec<_> = records
            .iter()
            .map(|r| hour_of(r.transit_timestamp))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let resolved = self.weather.and_then(|source| {
            let (Some(first), Some(last)) = (hours.first(), hours.last()) else {
                return None;
            };
            match source.hourly(self.location, first.date(), last.date()) {
                Ok(series) => {
                    debug!(
                        hours = series.len(),
                        start = %first.date(),
                        end = %last.date(),
                        "Fetched weather"
                    );
                    Some(resolve_hours(&hours, &series))
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        start = %first.date(),
                        end = %last.date(),
                        "Weather unavailable, continuing without weather"
                    );
                    None
                }
            }
        });

        let has_weather = resolved.is_some();
        let records = records
            .into_iter()
            .map(|record| {
                let calendar = calendar_fields(record.transit_timestamp, &holidays);
                let weather = resolved
                    .as_ref()
                    .and_then(|r| r.get(&hour_of(record.transit_timestamp)).copied())
                    .unwrap_or_else(WeatherValues::default);
                EnrichedRecord {
                    record,
                    calendar,
                    weather,
                }
            })
            .collect();

        EnrichedBatch {
            records,
            has_weather,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResult, HourlyWeather};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Mutex;

    struct FixedWeather {
        series: HourlyWeather,
        requests: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    }

    impl WeatherSource for FixedWeather {
        fn hourly(
            &self,
            _location: Location,
            start: NaiveDate,
            end: NaiveDate,
        ) -> FetchResult<HourlyWeather> {
            self.requests.lock().unwrap().push((start, end));
            Ok(self.series.clone())
        }
    }

    struct FailingWeather;

    impl WeatherSource for FailingWeather {
        fn hourly(&self, _: Location, _: NaiveDate, _: NaiveDate) -> FetchResult<HourlyWeather> {
            Err(FetchError::Status {
                status: 503,
                url: "weather".to_string(),
            })
        }
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn record(d: u32, h: u32, route: &str) -> RidershipRecord {
        RidershipRecord {
            transit_timestamp: at(d, h),
            route: route.to_string(),
            ridership: 100,
            transfers: 4,
        }
    }

    #[test]
    fn test_single_weather_request_per_batch() {
        let mut series = HourlyWeather::default();
        series.hours.insert(
            at(3, 8),
            WeatherValues {
                temperature_2m: Some(24.0),
                ..Default::default()
            },
        );
        let source = FixedWeather {
            series,
            requests: Mutex::new(Vec::new()),
        };

        let enricher =
            Enricher::new(Jurisdiction::NewYork, Location::default()).with_weather(&source);
        let batch = enricher.enrich(vec![
            record(4, 9, "M15"),
            record(3, 8, "M15"),
            record(4, 9, "B46"),
        ]);

        assert!(batch.has_weather);
        assert_eq!(batch.len(), 3);
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![(
                NaiveDate::from_ymd_opt(2024, 7, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
            )]
        );
        // Input order is kept; July 4 is a holiday, filled forward from July 3
        assert_eq!(batch.records[0].record.route, "M15");
        assert!(batch.records[0].calendar.is_holiday);
        assert_eq!(batch.records[0].weather.temperature_2m, Some(24.0));
        assert!(!batch.records[1].calendar.is_holiday);
    }

    #[test]
    fn test_weather_failure_is_tolerated() {
        let enricher =
            Enricher::new(Jurisdiction::NewYork, Location::default()).with_weather(&FailingWeather);
        let batch = enricher.enrich(vec![record(3, 8, "M15")]);
        assert_eq!(batch.len(), 1);
        assert!(!batch.has_weather);
        assert!(batch.records[0].weather.is_empty());
        assert_eq!(batch.records[0].calendar.hour, 8);
    }

    #[test]
    fn test_empty_batch_makes_no_request() {
        let source = FixedWeather {
            series: HourlyWeather::default(),
            requests: Mutex::new(Vec::new()),
        };
        let enricher =
            Enricher::new(Jurisdiction::NewYork, Location::default()).with_weather(&source);
        assert!(enricher.enrich(Vec::new()).is_empty());
        assert!(source.requests.lock().unwrap().is_empty());
    }
}
