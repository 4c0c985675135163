//! Job module
//!
//! A job is a YAML file describing one session and the reads and writes run
//! through it, in order: configure, read, write.
//!
//! # Overview
//!
//! - `JobDefinition` - Declarative job specification
//! - `load_job` - Parse, render templates and validate
//! - `run_job` - Execute the steps and report what happened

mod parser;
mod pipeline;
mod types;

pub use parser::{load_job, load_job_from_str, load_job_with_context, validate_job};
pub use pipeline::{build_session, read_step, run_job, write_step, JobReport, ReadReport, RunOptions};
pub use types::{
    JobDefinition, RangeSource, ReadDefinition, WarehouseDefinition, WriteDefinition, WriteSource,
};
