//! Hourly weather history

use std::collections::BTreeMap;
#[cfg(feature = "http-source")]
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[cfg(feature = "http-source")]
use super::error::FetchError;
use super::error::FetchResult;
use crate::record::WeatherValues;

/// Default Open-Meteo historical archive endpoint
pub const DEFAULT_WEATHER_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Hourly variables requested from the weather archive
pub const HOURLY_FIELDS: [&str; 7] = [
    "temperature_2m",
    "relative_humidity_2m",
    "precipitation",
    "rain",
    "snowfall",
    "weather_code",
    "wind_speed_10m",
];

/// A geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    /// Central Park, New York
    fn default() -> Self {
        Self {
            latitude: 40.78,
            longitude: -73.96,
        }
    }
}

/// Weather observations keyed by the hour they describe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlyWeather {
    pub hours: BTreeMap<NaiveDateTime, WeatherValues>,
}

impl HourlyWeather {
    pub fn get(&self, hour: &NaiveDateTime) -> Option<&WeatherValues> {
        self.hours.get(hour)
    }

    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}

/// A source of hourly weather for a point and an inclusive day range
pub trait WeatherSource: Send + Sync {
    fn hourly(&self, location: Location, start: NaiveDate, end: NaiveDate)
    -> FetchResult<HourlyWeather>;
}

impl<T: WeatherSource + ?Sized> WeatherSource for std::sync::Arc<T> {
    fn hourly(
        &self,
        location: Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FetchResult<HourlyWeather> {
        (**self).hourly(location, start, end)
    }
}

/// The `hourly` block of an archive response: parallel arrays indexed by `time`
#[derive(Debug, Default, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f32>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f32>>,
    #[serde(default)]
    pub precipitation: Vec<Option<f32>>,
    #[serde(default)]
    pub rain: Vec<Option<f32>>,
    #[serde(default)]
    pub snowfall: Vec<Option<f32>>,
    #[serde(default)]
    pub weather_code: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f32>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    hourly: Option<HourlyBlock>,
}

impl HourlyBlock {
    /// Convert the parallel arrays into a map keyed by hour.
    ///
    /// Arrays shorter than `time` leave the missing positions unknown;
    /// unparseable times are skipped.
    pub fn into_weather(self) -> HourlyWeather {
        fn at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
            values.get(i).copied().flatten()
        }

        let mut hours = BTreeMap::new();
        for (i, raw) in self.time.iter().enumerate() {
            let Some(hour) = parse_hour(raw) else {
                continue;
            };
            let values = WeatherValues {
                temperature_2m: at(&self.temperature_2m, i),
                relative_humidity_2m: at(&self.relative_humidity_2m, i),
                precipitation: at(&self.precipitation, i),
                rain: at(&self.rain, i),
                snowfall: at(&self.snowfall, i),
                weather_code: at(&self.weather_code, i)
                    .filter(|code| (0.0..=255.0).contains(code))
                    .map(|code| code.round() as u8),
                wind_speed_10m: at(&self.wind_speed_10m, i),
            };
            hours.insert(hour, values);
        }
        HourlyWeather { hours }
    }
}

fn parse_hour(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Parse a full archive response body
pub fn parse_archive_response(body: &str) -> Result<HourlyWeather, serde_json::Error> {
    let response: ArchiveResponse = serde_json::from_str(body)?;
    Ok(response.hourly.unwrap_or_default().into_weather())
}

/// Weather source backed by the Open-Meteo archive API
#[cfg(feature = "http-source")]
pub struct OpenMeteoSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "http-source")]
impl OpenMeteoSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[cfg(feature = "http-source")]
impl WeatherSource for OpenMeteoSource {
    fn hourly(
        &self,
        location: Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FetchResult<HourlyWeather> {
        let params = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("hourly", HOURLY_FIELDS.join(",")),
        ];

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .map_err(|e| FetchError::from_reqwest(&self.base_url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: self.base_url.clone(),
            });
        }

        let body = response
            .text()
            .map_err(|e| FetchError::from_reqwest(&self.base_url, e))?;
        parse_archive_response(&body).map_err(|e| FetchError::decode(&self.base_url, e.to_string()))
    }
}
