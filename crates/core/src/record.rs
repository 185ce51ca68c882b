//! Record types flowing through the pipeline

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Timestamp layout used by the ridership API (`2024-01-01T00:00:00.000`)
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One hourly ridership observation for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RidershipRecord {
    /// Local, timezone-naive instant of the observation
    #[serde(deserialize_with = "deserialize_api_timestamp")]
    pub transit_timestamp: NaiveDateTime,
    /// Route code, e.g. `M15`
    #[serde(rename = "bus_route")]
    pub route: String,
    /// Number of boardings
    #[serde(deserialize_with = "deserialize_count")]
    pub ridership: u32,
    /// Number of transfers
    #[serde(deserialize_with = "deserialize_count")]
    pub transfers: u32,
}

/// Calendar context derived from a record's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub hour: u8,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u8,
    pub month: u8,
    pub year: u16,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

/// Hourly weather values. Every field may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeatherValues {
    pub temperature_2m: Option<f32>,
    pub relative_humidity_2m: Option<f32>,
    pub precipitation: Option<f32>,
    pub rain: Option<f32>,
    pub snowfall: Option<f32>,
    pub weather_code: Option<u8>,
    pub wind_speed_10m: Option<f32>,
}

impl WeatherValues {
    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A ridership record with calendar and weather context attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: RidershipRecord,
    pub calendar: CalendarFields,
    pub weather: WeatherValues,
}

/// Output of the enrichment step for one unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedBatch {
    pub records: Vec<EnrichedRecord>,
    /// Whether weather columns were obtained for this batch
    pub has_weather: bool,
}

impl EnrichedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a timestamp as produced by the ridership API.
pub fn parse_api_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, API_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
}

fn deserialize_api_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_api_timestamp(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}

/// Counts arrive as JSON strings from the API; plain numbers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match RawCount::deserialize(deserializer)? {
        RawCount::Text(s) => s,
        RawCount::Number(n) => n.to_string(),
    };
    let trimmed = text.trim();
    // The API sometimes renders integral counts as "12.0"
    let integral = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    integral
        .parse::<u32>()
        .map_err(|_| serde::de::Error::custom(format!("invalid count '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_row() {
        let json = r#"{
            "transit_timestamp": "2024-01-02T07:00:00.000",
            "bus_route": "M15",
            "ridership": "431",
            "transfers": "12"
        }"#;
        let record: RidershipRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.route, "M15");
        assert_eq!(record.ridership, 431);
        assert_eq!(record.transfers, 12);
        assert_eq!(
            record.transit_timestamp.format("%Y-%m-%d %H:%M").to_string(),
            "2024-01-02 07:00"
        );
    }

    #[test]
    fn test_numeric_counts_accepted() {
        let json = r#"{"transit_timestamp": "2024-01-02T07:00:00", "bus_route": "B46",
                       "ridership": 5, "transfers": "3.0"}"#;
        let record: RidershipRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.ridership, 5);
        assert_eq!(record.transfers, 3);
    }

    #[test]
    fn test_negative_count_rejected() {
        let json = r#"{"transit_timestamp": "2024-01-02T07:00:00.000", "bus_route": "B46",
                       "ridership": "-4", "transfers": "0"}"#;
        assert!(serde_json::from_str::<RidershipRecord>(json).is_err());
    }

    #[test]
    fn test_weather_values_empty() {
        assert!(WeatherValues::default().is_empty());
        let values = WeatherValues {
            rain: Some(0.2),
            ..Default::default()
        };
        assert!(!values.is_empty());
    }
}
