//! Warehouse reads staged through blob storage

use crate::connector::options::{check_format, OptionMap, ReadOptions};
use crate::error::{Error, Result, ResultExt};
use crate::frame::DataFrame;
use crate::session::Session;
use crate::staging::{decode_parquet, part_file_name, StagingArea, StagingRun};
use crate::warehouse::{self, SourceQuery, Warehouse};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builder for a read from the warehouse
///
/// ```no_run
/// # async fn demo(session: sqldw_bridge::Session) -> sqldw_bridge::Result<()> {
/// let df = session
///     .read()
///     .format("sqldw")
///     .option("url", "jdbc:duckdb:warehouse.duckdb")
///     .option("tempDir", "file:///tmp/staging")
///     .option("dbTable", "dbo.DimProduct")
///     .load()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WarehouseReader {
    session: Session,
    format: Option<String>,
    options: OptionMap,
}

impl WarehouseReader {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            format: None,
            options: OptionMap::new(),
        }
    }

    /// Data source format
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set one connector option
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, value);
        self
    }

    /// Set several connector options
    #[must_use]
    pub fn options<K, V>(mut self, options: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in options {
            self.options.set(k, v);
        }
        self
    }

    /// Load the whole source into a dataframe
    pub async fn load(self) -> Result<DataFrame> {
        check_format(self.format.as_deref())?;
        let options = ReadOptions::parse(&self.options)?;
        let connection = &options.connection;

        // Credentials are resolved before the warehouse is contacted
        let staging = StagingArea::open(
            &connection.temp_dir,
            self.session.config(),
            connection.forward_credentials,
        )?;
        let warehouse = warehouse::connect(&connection.url)?;

        let started = Instant::now();
        info!(
            source = %options.source.describe(),
            warehouse = %connection.url.redacted(),
            staging = %staging.scheme(),
            "Reading from warehouse"
        );

        let run = staging.new_run();
        let result = unload_through_staging(warehouse.as_ref(), &staging, &run, &options.source).await;
        cleanup_run(&staging, &run).await;

        let (schema, batches) = result?;
        let df = DataFrame::new(schema, batches)?.with_session(self.session);

        info!(
            rows = df.num_rows(),
            columns = df.columns().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Read complete"
        );
        Ok(df)
    }
}

async fn unload_through_staging(
    warehouse: &dyn Warehouse,
    staging: &StagingArea,
    run: &StagingRun,
    source: &SourceQuery,
) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let scratch = tempfile::tempdir()?;
    let files = warehouse.unload(source, scratch.path()).await?;

    for (index, file) in files.iter().enumerate() {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read unloaded file {}", file.display()))?;
        let data = Bytes::from(data);
        let staged = staging.put(run, &part_file_name(index), data).await?;
        debug!(path = %staged, "Staged unloaded file");
    }

    let mut parts = Vec::new();
    for path in staging.list(run).await? {
        parts.push(staging.get(&path).await?);
    }
    decode_parts(parts)
}

/// Decode staged Parquet files that must all share one schema
pub(crate) fn decode_parts(parts: Vec<Bytes>) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let mut schema: Option<SchemaRef> = None;
    let mut batches = Vec::new();

    for part in parts {
        let (part_schema, part_batches) = decode_parquet(part)?;
        match &schema {
            Some(existing) if existing.fields() != part_schema.fields() => {
                return Err(Error::frame("staged files have different schemas"));
            }
            Some(_) => {}
            None => schema = Some(part_schema),
        }
        batches.extend(part_batches);
    }

    let schema = schema.ok_or_else(|| Error::staging("no staged files were produced"))?;
    Ok((schema, batches))
}

/// Remove a run directory, logging rather than failing
pub(crate) async fn cleanup_run(staging: &StagingArea, run: &StagingRun) {
    match staging.cleanup(run).await {
        Ok(removed) => debug!(path = %run.path(), removed, "Cleaned up staging run"),
        Err(e) => warn!(path = %run.path(), error = %e, "Failed to clean up staging run"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::staging::{encode_batches, ParquetWriterConfig};
    use pretty_assertions::assert_eq;

    fn session() -> Session {
        Session::new(SessionConfig::builder().build().unwrap())
    }

    #[tokio::test]
    async fn test_rejects_other_formats() {
        let err = session()
            .read()
            .format("parquet")
            .option("url", "jdbc:duckdb::memory:")
            .option("tempDir", "memory://tmp")
            .option("dbTable", "t")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { .. }));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_warehouse() {
        // The warehouse URL would fail to connect; the credential error must come first
        let err = session()
            .read()
            .format("sqldw")
            .option("url", "jdbc:sqlserver://dw:1433;database=db")
            .option("tempDir", "wasbs://ct1@acct.blob.core.windows.net/tempDirs")
            .option("forward_spark_azure_storage_credentials", "true")
            .option("dbTable", "dbo.DimProduct")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingStorageCredential { .. }));
    }

    #[tokio::test]
    async fn test_query_source() {
        let df = session()
            .read()
            .format("com.databricks.spark.sqldw")
            .options([
                ("url", "jdbc:duckdb::memory:"),
                ("tempDir", "memory://tempDirs"),
                ("query", "SELECT range AS id FROM range(3)"),
            ])
            .load()
            .await
            .unwrap();
        assert_eq!(df.num_rows(), 3);
        assert_eq!(df.columns(), vec!["id".to_string()]);
        assert!(df.session().is_some());
    }

    #[test]
    fn test_decode_parts() {
        let df = DataFrame::range(0, 2, 1).unwrap();
        let config = ParquetWriterConfig::new();
        let part = encode_batches(&df.schema(), df.batches(), &config).unwrap();

        let (schema, batches) = decode_parts(vec![part.clone(), part]).unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 4);

        let renamed = df.to_df(["value"]).unwrap();
        let other = encode_batches(&renamed.schema(), renamed.batches(), &config).unwrap();
        let first = encode_batches(&DataFrame::range(0, 1, 1).unwrap().schema(), &[], &config).unwrap();
        assert!(decode_parts(vec![first, other]).is_err());
        assert!(decode_parts(vec![]).is_err());
    }
}
