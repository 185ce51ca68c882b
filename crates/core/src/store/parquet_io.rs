//! Parquet file helpers shared by artifacts and the final dataset

use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;

use super::atomic::write_atomic;
use super::{StoreError, StoreResult};

/// Shared writer properties: snappy, dictionary encoding, page statistics
pub fn writer_properties() -> &'static WriterProperties {
    static PROPERTIES: OnceLock<WriterProperties> = OnceLock::new();
    PROPERTIES.get_or_init(|| {
        let metadata = vec![KeyValue {
            key: "transit-ridership.version".to_string(),
            value: Some(env!("CARGO_PKG_VERSION").to_string()),
        }];

        WriterProperties::builder()
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(64 * 1024)
            .set_key_value_metadata(Some(metadata))
            .build()
    })
}

/// Write a batch to `path`, replacing any previous file atomically
pub fn write_parquet_atomic(path: &Path, batch: &RecordBatch) -> StoreResult<()> {
    write_atomic(path, |file| {
        let mut writer =
            ArrowWriter::try_new(file, batch.schema(), Some(writer_properties().clone()))
                .map_err(|e| StoreError::parquet(path, e))?;
        writer.write(batch).map_err(|e| StoreError::parquet(path, e))?;
        writer.close().map_err(|e| StoreError::parquet(path, e))?;
        Ok(())
    })
}

/// Read a whole Parquet file into a single batch
pub fn read_parquet(path: &Path) -> StoreResult<RecordBatch> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| StoreError::parquet(path, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| StoreError::parquet(path, e))?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::parquet(path, e))?;

    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&schema, &batches).map_err(|e| StoreError::parquet(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, UInt32Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("counts.parquet");

        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::UInt32, false)]));
        let column: ArrayRef = Arc::new(UInt32Array::from(vec![1, 2, 3]));
        let batch = RecordBatch::try_new(schema, vec![column]).unwrap();

        write_parquet_atomic(&path, &batch).unwrap();
        assert!(path.exists());
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("counts.parquet")]);

        let read = read_parquet(&path).unwrap();
        assert_eq!(read.num_rows(), 3);
        assert_eq!(read.columns(), batch.columns());
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = read_parquet(&temp.path().join("absent.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
