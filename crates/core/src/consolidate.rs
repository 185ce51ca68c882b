//! Consolidation of weekly artifacts into the final partitioned dataset
//!
//! All artifacts are aligned on the union of their columns, concatenated,
//! sorted by `(transit_timestamp asc, ridership desc)` and written as one
//! Parquet file per `(year, bus_route)` partition:
//!
//! ```text
//! <destination>/year=2024/bus_route=M15/part-0.parquet
//! ```
//!
//! Partition columns are encoded in the directory names and left out of the
//! files themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use arrow::array::{ArrayRef, AsArray, UInt32Array, new_null_array};
use arrow::compute::{
    SortColumn, SortOptions, cast, concat_batches, lexsort_to_indices, take_record_batch,
};
use arrow::datatypes::{DataType, UInt16Type};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{
    RIDERSHIP_COLUMN, RIDERSHIP_FIELDS, ROUTE_COLUMN, SchemaError, TIMESTAMP_COLUMN, YEAR_COLUMN,
    project_columns,
};
use crate::store::{StoreError, WeeklyUnitStore, read_parquet, write_parquet_atomic};

/// Default name of the final dataset directory
pub const FINAL_DATASET_NAME: &str = "ridership_enriched_final.parquet";

/// File name of the single data file inside each partition
const PART_FILE_NAME: &str = "part-0.parquet";

/// Errors raised while consolidating
#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Artifact {path} does not match the schema: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Invalid partition path: {0}")]
    InvalidPartition(PathBuf),
}

/// Result type for consolidation
pub type ConsolidationResult<T> = Result<T, ConsolidationError>;

/// What a consolidation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// No artifact held any row; nothing was written
    NothingToConsolidate,
    /// The dataset was written
    Written {
        /// Artifacts that contributed rows
        artifacts: usize,
        /// Total rows written
        rows: usize,
        /// Partition files written, in partition order
        partitions: Vec<PathBuf>,
    },
}

impl ConsolidationOutcome {
    pub fn rows(&self) -> usize {
        match self {
            Self::NothingToConsolidate => 0,
            Self::Written { rows, .. } => *rows,
        }
    }
}

/// One partition file of the final dataset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionFile {
    pub year: u16,
    pub route: String,
    pub path: PathBuf,
}

/// Merges weekly artifacts into the final dataset
pub struct Consolidator<'a> {
    store: &'a WeeklyUnitStore,
}

impl<'a> Consolidator<'a> {
    pub fn new(store: &'a WeeklyUnitStore) -> Self {
        Self { store }
    }

    /// Read, merge, sort and write every artifact to `destination`.
    ///
    /// An existing dataset at `destination` is replaced.
    pub fn consolidate(&self, destination: &Path) -> ConsolidationResult<ConsolidationOutcome> {
        let mut artifacts = self.store.list_all()?;
        artifacts.sort();

        let mut batches = Vec::new();
        for artifact in &artifacts {
            let batch = self.store.read(artifact)?;
            if batch.num_rows() == 0 {
                debug!(path = %artifact.path.display(), "Skipping empty artifact");
                continue;
            }
            batches.push((artifact.path.clone(), batch));
        }

        if batches.is_empty() {
            info!(artifacts = artifacts.len(), "No rows to consolidate");
            return Ok(ConsolidationOutcome::NothingToConsolidate);
        }

        let merged = merge_batches(&batches)?;
        let sorted = sort_batch(&merged)?;
        let partitions = split_partitions(&sorted)?;

        remove_existing(destination)?;

        let mut written = Vec::with_capacity(partitions.len());
        for ((year, route), batch) in partitions {
            let path = partition_path(destination, year, &route);
            write_parquet_atomic(&path, &batch)?;
            debug!(path = %path.display(), rows = batch.num_rows(), "Wrote partition");
            written.push(path);
        }

        info!(
            artifacts = batches.len(),
            rows = sorted.num_rows(),
            partitions = written.len(),
            destination = %destination.display(),
            "Consolidated dataset"
        );

        Ok(ConsolidationOutcome::Written {
            artifacts: batches.len(),
            rows: sorted.num_rows(),
            partitions: written,
        })
    }
}

/// Align batches on the union of their columns and concatenate them
fn merge_batches(batches: &[(PathBuf, RecordBatch)]) -> ConsolidationResult<RecordBatch> {
    let present: BTreeSet<&str> = RIDERSHIP_FIELDS
        .iter()
        .filter(|spec| {
            batches
                .iter()
                .any(|(_, b)| b.column_by_name(spec.name).is_some())
        })
        .map(|spec| spec.name)
        .collect();

    let mut aligned = Vec::with_capacity(batches.len());
    for (path, batch) in batches {
        let mut columns: Vec<(String, ArrayRef)> = batch
            .schema()
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, column)| (field.name().clone(), column.clone()))
            .collect();

        for spec in RIDERSHIP_FIELDS.iter() {
            let missing = batch.column_by_name(spec.name).is_none();
            if missing && !spec.is_required() && present.contains(spec.name) {
                columns.push((
                    spec.name.to_string(),
                    new_null_array(&spec.kind.data_type(), batch.num_rows()),
                ));
            }
        }

        let typed = project_columns(columns, batch.num_rows()).map_err(|source| {
            ConsolidationError::Schema {
                path: path.clone(),
                source,
            }
        })?;
        aligned.push(typed);
    }

    let schema = aligned[0].schema();
    Ok(concat_batches(&schema, &aligned)?)
}

/// Sort by timestamp ascending, then ridership descending
fn sort_batch(batch: &RecordBatch) -> ConsolidationResult<RecordBatch> {
    let column = |name: &str| {
        batch
            .column_by_name(name)
            .cloned()
            .ok_or_else(|| ArrowError::SchemaError(format!("missing column {name}")))
    };

    let indices = lexsort_to_indices(
        &[
            SortColumn {
                values: column(TIMESTAMP_COLUMN)?,
                options: Some(SortOptions {
                    descending: false,
                    nulls_first: false,
                }),
            },
            SortColumn {
                values: column(RIDERSHIP_COLUMN)?,
                options: Some(SortOptions {
                    descending: true,
                    nulls_first: false,
                }),
            },
        ],
        None,
    )?;

    Ok(take_record_batch(batch, &indices)?)
}

/// Split a sorted batch by `(year, route)`, keeping row order within each part.
/// Partition columns are dropped from the parts.
fn split_partitions(
    batch: &RecordBatch,
) -> ConsolidationResult<BTreeMap<(u16, String), RecordBatch>> {
    let schema = batch.schema();
    let year_index = schema.index_of(YEAR_COLUMN)?;
    let route_index = schema.index_of(ROUTE_COLUMN)?;

    let years = cast(batch.column(year_index), &DataType::UInt16)?;
    let years = years.as_primitive::<UInt16Type>();
    let routes = cast(batch.column(route_index), &DataType::Utf8)?;
    let routes = routes.as_string::<i32>();

    let mut rows: BTreeMap<(u16, String), Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let key = (years.value(row), routes.value(row).to_string());
        rows.entry(key).or_default().push(row as u32);
    }

    let keep: Vec<usize> = (0..schema.fields().len())
        .filter(|i| *i != year_index && *i != route_index)
        .collect();
    let data = batch.project(&keep)?;

    let mut parts = BTreeMap::new();
    for (key, indices) in rows {
        let indices = UInt32Array::from(indices);
        parts.insert(key, take_record_batch(&data, &indices)?);
    }
    Ok(parts)
}

fn remove_existing(destination: &Path) -> ConsolidationResult<()> {
    let result = if destination.is_dir() {
        fs::remove_dir_all(destination)
    } else if destination.exists() {
        fs::remove_file(destination)
    } else {
        return Ok(());
    };
    result.map_err(|e| ConsolidationError::Store(StoreError::io(destination, e)))
}

/// Hive-style path of a partition file
pub fn partition_path(destination: &Path, year: u16, route: &str) -> PathBuf {
    destination
        .join(format!("{YEAR_COLUMN}={year}"))
        .join(format!("{ROUTE_COLUMN}={}", escape_partition_value(route)))
        .join(PART_FILE_NAME)
}

/// Percent-encode characters that cannot appear in a directory name
fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' | '\\' | '%' | '=' | ':' | '\n' => escaped.push_str(&format!("%{:02X}", c as u32)),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_partition_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(byte) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// List the partition files of a written dataset
pub fn list_partitions(destination: &Path) -> ConsolidationResult<Vec<PartitionFile>> {
    let pattern = format!(
        "{}/{YEAR_COLUMN}=*/{ROUTE_COLUMN}=*/*.parquet",
        glob::Pattern::escape(&destination.to_string_lossy())
    );
    let paths = glob::glob(&pattern).map_err(|e| StoreError::Pattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    let mut partitions = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            StoreError::io(path, e.into())
        })?;
        let invalid = || ConsolidationError::InvalidPartition(path.clone());

        let route_dir = path.parent().ok_or_else(invalid)?;
        let year_dir = route_dir.parent().ok_or_else(invalid)?;
        let route = dir_value(route_dir, ROUTE_COLUMN).ok_or_else(invalid)?;
        let year = dir_value(year_dir, YEAR_COLUMN)
            .and_then(|y| y.parse::<u16>().ok())
            .ok_or_else(invalid)?;

        partitions.push(PartitionFile {
            year,
            route: unescape_partition_value(&route),
            path,
        });
    }
    partitions.sort();
    Ok(partitions)
}

fn dir_value(dir: &Path, key: &str) -> Option<String> {
    dir.file_name()?
        .to_str()?
        .strip_prefix(key)?
        .strip_prefix('=')
        .map(str::to_string)
}

/// Read one partition file back
pub fn read_partition(partition: &PartitionFile) -> ConsolidationResult<RecordBatch> {
    Ok(read_parquet(&partition.path)?)
}
