//! Staging module
//!
//! Data moves between the session and the warehouse through Parquet files
//! in blob storage. Every read or write gets its own run directory under the
//! configured `tempDir`, removed once the transfer finishes.
//!
//! # Overview
//!
//! - `StagingArea` - Object store rooted at `tempDir` with credentials resolved
//! - `StagingRun` - Per-operation directory inside a staging area
//! - `ParquetWriterConfig` - Compression and format version of staged files

mod area;
mod parquet;

pub use area::{StagingArea, StagingLocation, StagingRun};
pub use parquet::{decode_parquet, encode_batches, file_version, ParquetWriterConfig};

/// Name of the n-th staged data file in a run directory
pub fn part_file_name(index: usize) -> String {
    format!("part-{index:05}.parquet")
}
