//! Column schema for enriched ridership data
//!
//! The schema is a fixed, ordered list of fields. Each field is either
//! required (must be present in every batch) or optional (weather columns,
//! which are absent when weather could not be fetched). Typing projects a
//! batch onto this list: unknown columns are dropped, absent optional columns
//! are omitted, and a missing required column is an error.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, StringArray, TimestampNanosecondArray,
    UInt8Array, UInt16Array, UInt32Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use thiserror::Error;

use crate::record::EnrichedBatch;

/// Name of the timestamp column
pub const TIMESTAMP_COLUMN: &str = "transit_timestamp";
/// Name of the route column
pub const ROUTE_COLUMN: &str = "bus_route";
/// Name of the ridership column
pub const RIDERSHIP_COLUMN: &str = "ridership";
/// Name of the year column
pub const YEAR_COLUMN: &str = "year";

/// Errors raised while typing a batch
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A required column is absent from the batch
    #[error("Required column '{0}' is missing")]
    MissingRequired(String),

    /// A column could not be converted to its declared type
    #[error("Column '{field}' cannot be converted to {target}: {message}")]
    Conversion {
        field: String,
        target: String,
        message: String,
    },

    /// Arrow rejected the assembled batch
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Logical kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Naive instant, nanosecond precision
    DateTime,
    /// Low-cardinality string, dictionary encoded
    Categorical,
    /// Non-negative 32-bit count
    Count,
    /// Non-negative 8-bit integer
    SmallInt,
    /// Non-negative 16-bit integer
    Year,
    Boolean,
    Float,
}

impl FieldKind {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldKind::DateTime => DataType::Timestamp(TimeUnit::Nanosecond, None),
            FieldKind::Categorical => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            FieldKind::Count => DataType::UInt32,
            FieldKind::SmallInt => DataType::UInt8,
            FieldKind::Year => DataType::UInt16,
            FieldKind::Boolean => DataType::Boolean,
            FieldKind::Float => DataType::Float32,
        }
    }
}

/// Whether a column must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// One declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldSpec {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Optional,
        }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// Arrow field; optional columns are nullable
    pub fn to_field(&self) -> Field {
        Field::new(self.name, self.kind.data_type(), !self.is_required())
    }
}

/// Declared columns in output order
pub const RIDERSHIP_FIELDS: [FieldSpec; 17] = [
    FieldSpec::required(TIMESTAMP_COLUMN, FieldKind::DateTime),
    FieldSpec::required(ROUTE_COLUMN, FieldKind::Categorical),
    FieldSpec::required(RIDERSHIP_COLUMN, FieldKind::Count),
    FieldSpec::required("transfers", FieldKind::Count),
    FieldSpec::required("hour", FieldKind::SmallInt),
    FieldSpec::required("day_of_week", FieldKind::SmallInt),
    FieldSpec::required("month", FieldKind::SmallInt),
    FieldSpec::required(YEAR_COLUMN, FieldKind::Year),
    FieldSpec::required("is_weekend", FieldKind::Boolean),
    FieldSpec::required("is_holiday", FieldKind::Boolean),
    FieldSpec::optional("temperature_2m", FieldKind::Float),
    FieldSpec::optional("relative_humidity_2m", FieldKind::Float),
    FieldSpec::optional("precipitation", FieldKind::Float),
    FieldSpec::optional("rain", FieldKind::Float),
    FieldSpec::optional("snowfall", FieldKind::Float),
    FieldSpec::optional("weather_code", FieldKind::SmallInt),
    FieldSpec::optional("wind_speed_10m", FieldKind::Float),
];

/// Schema with every declared column
pub fn full_schema() -> SchemaRef {
    Arc::new(Schema::new(
        RIDERSHIP_FIELDS
            .iter()
            .map(FieldSpec::to_field)
            .collect::<Vec<_>>(),
    ))
}

/// Project named columns onto the declared schema.
///
/// Columns are emitted in declared order and converted to their declared
/// type. Undeclared columns are dropped; absent optional columns are omitted.
pub fn project_columns(
    columns: Vec<(String, ArrayRef)>,
    num_rows: usize,
) -> SchemaResult<RecordBatch> {
    let mut fields = Vec::new();
    let mut arrays = Vec::new();

    for spec in RIDERSHIP_FIELDS.iter() {
        let Some((_, array)) = columns.iter().find(|(name, _)| name == spec.name) else {
            if spec.is_required() {
                return Err(SchemaError::MissingRequired(spec.name.to_string()));
            }
            continue;
        };

        let target = spec.kind.data_type();
        let typed = if array.data_type() == &target {
            array.clone()
        } else {
            cast(array.as_ref(), &target).map_err(|e| SchemaError::Conversion {
                field: spec.name.to_string(),
                target: target.to_string(),
                message: e.to_string(),
            })?
        };

        if spec.is_required() && typed.null_count() > 0 {
            return Err(SchemaError::Conversion {
                field: spec.name.to_string(),
                target: target.to_string(),
                message: format!("{} null values in a required column", typed.null_count()),
            });
        }

        fields.push(spec.to_field());
        arrays.push(typed);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

/// Type an enriched batch
pub fn apply_schema(batch: &EnrichedBatch) -> SchemaResult<RecordBatch> {
    project_columns(batch_columns(batch), batch.len())
}

/// Raw columns of an enriched batch; weather columns only when weather was joined
fn batch_columns(batch: &EnrichedBatch) -> Vec<(String, ArrayRef)> {
    let records = &batch.records;

    let timestamps: TimestampNanosecondArray = records
        .iter()
        .map(|r| r.record.transit_timestamp.and_utc().timestamp_nanos_opt())
        .collect();
    let routes: StringArray = records
        .iter()
        .map(|r| Some(r.record.route.as_str()))
        .collect();

    let mut columns: Vec<(String, ArrayRef)> = vec![
        (TIMESTAMP_COLUMN.to_string(), Arc::new(timestamps)),
        (ROUTE_COLUMN.to_string(), Arc::new(routes)),
        (
            RIDERSHIP_COLUMN.to_string(),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.record.ridership),
            )),
        ),
        (
            "transfers".to_string(),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.record.transfers),
            )),
        ),
        (
            "hour".to_string(),
            Arc::new(UInt8Array::from_iter_values(
                records.iter().map(|r| r.calendar.hour),
            )),
        ),
        (
            "day_of_week".to_string(),
            Arc::new(UInt8Array::from_iter_values(
                records.iter().map(|r| r.calendar.day_of_week),
            )),
        ),
        (
            "month".to_string(),
            Arc::new(UInt8Array::from_iter_values(
                records.iter().map(|r| r.calendar.month),
            )),
        ),
        (
            YEAR_COLUMN.to_string(),
            Arc::new(UInt16Array::from_iter_values(
                records.iter().map(|r| r.calendar.year),
            )),
        ),
        (
            "is_weekend".to_string(),
            Arc::new(BooleanArray::from_iter(
                records.iter().map(|r| Some(r.calendar.is_weekend)),
            )),
        ),
        (
            "is_holiday".to_string(),
            Arc::new(BooleanArray::from_iter(
                records.iter().map(|r| Some(r.calendar.is_holiday)),
            )),
        ),
    ];

    if batch.has_weather {
        let float = |f: fn(&crate::record::WeatherValues) -> Option<f32>| -> ArrayRef {
            Arc::new(Float32Array::from_iter(records.iter().map(|r| f(&r.weather))))
        };
        columns.push(("temperature_2m".to_string(), float(|w| w.temperature_2m)));
        columns.push((
            "relative_humidity_2m".to_string(),
            float(|w| w.relative_humidity_2m),
        ));
        columns.push(("precipitation".to_string(), float(|w| w.precipitation)));
        columns.push(("rain".to_string(), float(|w| w.rain)));
        columns.push(("snowfall".to_string(), float(|w| w.snowfall)));
        columns.push((
            "weather_code".to_string(),
            Arc::new(UInt8Array::from_iter(
                records.iter().map(|r| r.weather.weather_code),
            )),
        ));
        columns.push(("wind_speed_10m".to_string(), float(|w| w.wind_speed_10m)));
    }

    columns
}
