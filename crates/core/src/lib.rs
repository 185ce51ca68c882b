//! Transit Ridership Core - Weekly ridership extraction and consolidation
//!
//! Provides:
//! - Weekly unit planning for calendar years
//! - Paginated ridership and hourly weather fetching
//! - Calendar, holiday and weather enrichment
//! - A fixed Arrow schema for enriched ridership rows
//! - Parquet artifact and checkpoint storage
//! - Consolidation into a year/route partitioned dataset
//! - A resumable pipeline tying the steps together

pub mod consolidate;
pub mod enrich;
pub mod fetch;
pub mod periods;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use consolidate::{ConsolidationError, ConsolidationOutcome, Consolidator, PartitionFile};
pub use enrich::{Enricher, HolidayCalendar, Jurisdiction};
#[cfg(feature = "http-source")]
pub use fetch::{HttpRidershipSource, OpenMeteoSource};
pub use fetch::{
    FetchError, HourlyWeather, Location, RemoteFetcher, RidershipSource, WeatherSource,
};
pub use periods::{WeeklyUnit, plan_units};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineExecutor, PipelineReport, PipelineResult,
    StatusSnapshot,
};
pub use record::{EnrichedBatch, EnrichedRecord, RidershipRecord, WeatherValues};
pub use schema::{SchemaError, apply_schema, full_schema};
pub use store::{ProgressState, ProgressStore, StoreError, WeeklyUnitStore};
