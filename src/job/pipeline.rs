//! Job execution
//!
//! Steps run strictly in order: the session is configured, then the read
//! step runs, then the write step. The first failure ends the job.

use crate::connector::WriteReport;
use crate::error::{Error, Result};
use crate::frame::DataFrame;
use crate::job::types::{JobDefinition, ReadDefinition, WriteDefinition, WriteSource};
use crate::session::Session;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Options for a job run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Plan the write without mutating the warehouse
    pub dry_run: bool,
}

/// Summary of the read step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadReport {
    pub rows: usize,
    pub columns: Vec<String>,
}

impl ReadReport {
    fn from_frame(df: &DataFrame) -> Self {
        Self {
            rows: df.num_rows(),
            columns: df.columns(),
        }
    }
}

/// Summary of a job run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteReport>,
    pub duration_ms: u64,
}

/// Configure a session from the job's `session` block
pub fn build_session(def: &JobDefinition) -> Result<Session> {
    let config = def.session_config()?;
    info!(job = %def.name, options = config.len(), "Session configured");
    Ok(Session::new(config))
}

/// Run a read step
pub async fn read_step(
    session: &Session,
    def: &JobDefinition,
    read: &ReadDefinition,
) -> Result<DataFrame> {
    session
        .read()
        .format(def.warehouse.format.as_str())
        .options(def.warehouse.connector_options())
        .options(read.connector_options())
        .load()
        .await
}

/// Run a write step
///
/// `read_frame` is the output of the read step, used when the write source is `read`.
pub async fn write_step(
    session: &Session,
    def: &JobDefinition,
    write: &WriteDefinition,
    read_frame: Option<&DataFrame>,
    dry_run: bool,
) -> Result<WriteReport> {
    let frame = match &write.source {
        WriteSource::Range(range) => session
            .range(range.start, range.end, range.step)?
            .to_df([range.column.as_str()])?,
        WriteSource::Read => read_frame
            .cloned()
            .ok_or_else(|| Error::config("Write source 'read' needs a read step"))?,
    };

    frame
        .write()
        .format(def.warehouse.format.as_str())
        .options(def.warehouse.connector_options())
        .options(write.connector_options())
        .mode(write.mode)
        .confirm_overwrite(write.confirm_overwrite)
        .dry_run(dry_run)
        .save()
        .await
}

/// Run every step of a job
pub async fn run_job(def: &JobDefinition, options: RunOptions) -> Result<JobReport> {
    let started = Instant::now();
    info!(job = %def.name, dry_run = options.dry_run, "Starting job");

    let session = build_session(def)?;

    let frame = match &def.read {
        Some(read) => Some(read_step(&session, def, read).await?),
        None => None,
    };

    let write = match &def.write {
        Some(write) => {
            Some(write_step(&session, def, write, frame.as_ref(), options.dry_run).await?)
        }
        None => None,
    };

    let report = JobReport {
        job: def.name.clone(),
        read: frame.as_ref().map(ReadReport::from_frame),
        write,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(job = %def.name, duration_ms = report.duration_ms, "Job complete");
    Ok(report)
}
