//! Dataframe writes staged through blob storage

use crate::connector::options::{check_format, OptionMap, WriteOptions};
use crate::connector::reader::cleanup_run;
use crate::error::{Error, Result};
use crate::frame::DataFrame;
use crate::staging::{encode_batches, part_file_name, ParquetWriterConfig, StagingArea, StagingRun};
use crate::types::WriteMode;
use crate::warehouse::{self, LoadOutcome, LoadRequest, Warehouse};
use bytes::Bytes;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// What a write did, or would do on a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Destination table
    pub table: String,
    /// Requested write mode
    pub mode: WriteMode,
    /// Rows written (or that would be written on a dry run)
    pub rows: u64,
    /// Whether the destination existed before the write
    pub table_existed: bool,
    /// True when nothing was mutated because `dry_run` was set
    pub dry_run: bool,
    /// True when `Ignore` found an existing table
    pub skipped: bool,
    /// Parquet files staged for the load
    pub staged_files: usize,
    /// Whether staged files used the legacy Parquet layout
    pub legacy_parquet: bool,
}

/// Builder for a write of a dataframe into the warehouse
#[derive(Debug, Clone)]
pub struct DataFrameWriter<'a> {
    frame: &'a DataFrame,
    format: Option<String>,
    options: OptionMap,
    mode: WriteMode,
    confirm_overwrite: bool,
    dry_run: bool,
}

impl<'a> DataFrameWriter<'a> {
    pub(crate) fn new(frame: &'a DataFrame) -> Self {
        Self {
            frame,
            format: None,
            options: OptionMap::new(),
            mode: WriteMode::default(),
            confirm_overwrite: false,
            dry_run: false,
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

    /// How to treat an existing destination table
    #[must_use]
    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Allow `Overwrite` to replace an existing table
    #[must_use]
    pub fn confirm_overwrite(mut self, confirmed: bool) -> Self {
        self.confirm_overwrite = confirmed;
        self
    }

    /// Validate and report without staging or mutating anything
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Write the dataframe
    pub async fn save(self) -> Result<WriteReport> {
        check_format(self.format.as_deref())?;
        let options = WriteOptions::parse(&self.options)?;
        let session = self.frame.session().ok_or_else(|| {
            Error::frame("DataFrame is not bound to a session; create it through a Session")
        })?;

        if self.mode.is_destructive() && !(self.confirm_overwrite || options.confirm_overwrite) {
            return Err(Error::OverwriteNotConfirmed {
                table: options.table.to_string(),
            });
        }

        let connection = &options.connection;
        let staging = StagingArea::open(
            &connection.temp_dir,
            session.config(),
            connection.forward_credentials,
        )?;
        let warehouse = if self.dry_run {
            warehouse::connect_read_only(&connection.url)?
        } else {
            warehouse::connect(&connection.url)?
        };
        let table_existed = warehouse.table_exists(&options.table).await?;
        let legacy_parquet = session.config().legacy_parquet_format();

        let mut report = WriteReport {
            table: options.table.to_string(),
            mode: self.mode,
            rows: self.frame.num_rows() as u64,
            table_existed,
            dry_run: self.dry_run,
            skipped: false,
            staged_files: 0,
            legacy_parquet,
        };

        match (self.mode, table_existed) {
            (WriteMode::ErrorIfExists, true) => {
                return Err(Error::TableExists {
                    table: report.table,
                })
            }
            (WriteMode::Ignore, true) => {
                info!(table = %report.table, dry_run = self.dry_run, "Table exists, skipping write");
                report.rows = 0;
                report.skipped = true;
                return Ok(report);
            }
            _ => {}
        }

        if self.dry_run {
            info!(table = %report.table, mode = %self.mode, rows = report.rows, "Dry run, nothing written");
            return Ok(report);
        }

        let started = Instant::now();
        info!(
            table = %report.table,
            mode = %self.mode,
            rows = report.rows,
            warehouse = %connection.url.redacted(),
            staging = %staging.scheme(),
            legacy_parquet,
            "Writing to warehouse"
        );

        let config = ParquetWriterConfig::new().with_legacy_format(legacy_parquet);
        let data = encode_batches(&self.frame.schema(), self.frame.batches(), &config)?;

        let run = staging.new_run();
        let request = LoadRequest {
            table: options.table.clone(),
            files: Vec::new(),
            mode: self.mode,
            pre_actions: options.pre_actions.clone(),
            post_actions: options.post_actions.clone(),
        };
        let result = load_through_staging(warehouse.as_ref(), &staging, &run, data, request).await;
        cleanup_run(&staging, &run).await;

        let (outcome, staged_files) = result?;
        report.rows = outcome.rows;
        report.skipped = !outcome.applied;
        report.staged_files = staged_files;

        info!(
            table = %report.table,
            rows = report.rows,
            duration_ms = started.elapsed().as_millis() as u64,
            "Write complete"
        );
        Ok(report)
    }
}

async fn load_through_staging(
    warehouse: &dyn Warehouse,
    staging: &StagingArea,
    run: &StagingRun,
    data: Bytes,
    mut request: LoadRequest,
) -> Result<(LoadOutcome, usize)> {
    let staged = staging.put(run, &part_file_name(0), data).await?;
    debug!(path = %staged, "Staged dataframe");

    // The warehouse bulk-loads from local files
    let scratch = tempfile::tempdir()?;
    for (index, path) in staging.list(run).await?.iter().enumerate() {
        let local = scratch.path().join(part_file_name(index));
        tokio::fs::write(&local, staging.get(path).await?).await?;
        request.files.push(local);
    }

    let staged_files = request.files.len();
    let outcome = warehouse.load(request).await?;
    Ok((outcome, staged_files))
}
