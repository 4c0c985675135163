//! Parquet encoding for staged data
//!
//! Dataframes are staged as Parquet objects. The legacy layout targets older
//! readers: format version 1.0 pages and no embedded Arrow schema.

use crate::error::{Error, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriterOptions;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{WriterProperties, WriterVersion};

/// Configuration for staged Parquet files
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
    dictionary_enabled: bool,
    legacy_format: bool,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: 1024 * 1024, // 1M rows
            dictionary_enabled: true,
            legacy_format: false,
        }
    }
}

impl ParquetWriterConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit the legacy-compatible layout
    #[must_use]
    pub fn with_legacy_format(mut self, enabled: bool) -> Self {
        self.legacy_format = enabled;
        self
    }

    /// Whether the legacy layout is used
    #[must_use]
    pub fn is_legacy_format(&self) -> bool {
        self.legacy_format
    }

    /// Parquet format version written
    #[must_use]
    pub fn writer_version(&self) -> WriterVersion {
        if self.legacy_format {
            WriterVersion::PARQUET_1_0
        } else {
            WriterVersion::PARQUET_2_0
        }
    }

    /// Get row group size
    #[must_use]
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    /// Build writer properties
    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(self.writer_version())
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .set_dictionary_enabled(self.dictionary_enabled)
            .build()
    }
}

/// Encode batches into an in-memory Parquet file
///
/// An empty batch list still yields a valid file carrying `schema`.
pub fn encode_batches(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    config: &ParquetWriterConfig,
) -> Result<Bytes> {
    let options = ArrowWriterOptions::new()
        .with_properties(config.build_properties())
        .with_skip_arrow_metadata(config.legacy_format);

    let mut writer = ArrowWriter::try_new_with_options(Vec::new(), schema.clone(), options)
        .map_err(|e| Error::staging(format!("Failed to create Parquet writer: {e}")))?;

    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| Error::staging(format!("Failed to write batch: {e}")))?;
    }

    let buffer = writer
        .into_inner()
        .map_err(|e| Error::staging(format!("Failed to close Parquet writer: {e}")))?;

    Ok(Bytes::from(buffer))
}

/// Decode an in-memory Parquet file
pub fn decode_parquet(data: Bytes) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Format version recorded in a Parquet file's footer
pub fn file_version(data: Bytes) -> Result<i32> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    Ok(builder.metadata().file_metadata().version())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DataFrame;
    use arrow::array::Int64Array;
    use pretty_assertions::assert_eq;

    fn sample() -> DataFrame {
        DataFrame::range(0, 5, 1).unwrap().to_df(["value"]).unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_rows() {
        let df = sample();
        let data = encode_batches(&df.schema(), df.batches(), &ParquetWriterConfig::new()).unwrap();

        let (schema, batches) = decode_parquet(data).unwrap();
        assert_eq!(schema.field(0).name(), "value");

        let values: Vec<i64> = batches
            .iter()
            .flat_map(|b| {
                let col = b.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
                col.values().to_vec()
            })
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_legacy_format_writes_version_one() {
        let df = sample();

        let modern = encode_batches(&df.schema(), df.batches(), &ParquetWriterConfig::new()).unwrap();
        let legacy = encode_batches(
            &df.schema(),
            df.batches(),
            &ParquetWriterConfig::new().with_legacy_format(true),
        )
        .unwrap();

        assert_eq!(file_version(legacy).unwrap(), 1);
        assert_eq!(file_version(modern).unwrap(), 2);
    }

    #[test]
    fn test_empty_frame_keeps_schema() {
        let df = DataFrame::empty(sample().schema());
        let data = encode_batches(&df.schema(), df.batches(), &ParquetWriterConfig::new()).unwrap();

        let (schema, batches) = decode_parquet(data).unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = ParquetWriterConfig::default();
        assert!(!config.is_legacy_format());
        assert_eq!(config.row_group_size(), 1024 * 1024);
        assert_eq!(config.writer_version(), WriterVersion::PARQUET_2_0);
    }
}
