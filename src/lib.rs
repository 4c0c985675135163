// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # sqldw-bridge
//!
//! Bulk reads and writes between a SQL data warehouse and in-memory Arrow
//! dataframes, staged as Parquet files in blob storage.
//!
//! ## Features
//!
//! - **Session Configuration**: Immutable key/value options, including the
//!   legacy Parquet flag and storage account keys
//! - **Warehouse Reads**: Full-table or query unloads into a [`DataFrame`]
//! - **Warehouse Writes**: Overwrite, append, error-if-exists and ignore modes,
//!   loaded in a single transaction
//! - **Blob Staging**: Azure Blob, local filesystem or in-memory staging areas
//! - **Job Files**: YAML jobs with `{{ env.NAME }}` secret injection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqldw_bridge::{Secret, Session, SessionConfig, WriteMode, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let key = Secret::new(std::env::var("STORAGE_ACCOUNT_KEY").unwrap_or_default());
//!     let session = Session::new(
//!         SessionConfig::builder()
//!             .legacy_parquet_format(true)
//!             .storage_account_key("bvbdemodb001", &key)
//!             .build()?,
//!     );
//!
//!     let url = std::env::var("WAREHOUSE_URL").unwrap_or_default();
//!     let temp_dir = "wasbs://ct1@bvbdemodb001.blob.core.windows.net/tempDirs";
//!
//!     let products = session
//!         .read()
//!         .format("sqldw")
//!         .option("url", &url)
//!         .option("tempDir", temp_dir)
//!         .option("forward_spark_azure_storage_credentials", "true")
//!         .option("dbTable", "dbo.DimProduct")
//!         .load()
//!         .await?;
//!
//!     let df = session.range(0, 5, 1)?.to_df(["value"])?;
//!     df.write()
//!         .format("sqldw")
//!         .option("url", &url)
//!         .option("tempDir", temp_dir)
//!         .option("forward_spark_azure_storage_credentials", "true")
//!         .option("dbTable", "fromDB")
//!         .mode(WriteMode::Overwrite)
//!         .confirm_overwrite(true)
//!         .save()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Session (SessionConfig)                    │
//! │   read() → WarehouseReader   range() → DataFrame   sql()      │
//! └───────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴──────────────┬─────────────────┐
//! │  Connector   │           Staging            │    Warehouse    │
//! ├──────────────┼──────────────────────────────┼─────────────────┤
//! │ Options      │ Azure Blob / local / memory  │ DuckDB          │
//! │ Reader       │ Parquet encode/decode        │ PostgreSQL      │
//! │ Writer       │ Per-run directories          │ MySQL / SQLite  │
//! └──────────────┴──────────────────────────────┴─────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Template interpolation
pub mod template;

/// Session configuration and entry point
pub mod session;

/// In-memory dataframes
pub mod frame;

/// Warehouse URLs, tables and the bulk load backend
pub mod warehouse;

/// Blob storage staging and Parquet encoding
pub mod staging;

/// Warehouse reader and writer
pub mod connector;

/// YAML job definitions and execution
pub mod job;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use connector::{DataFrameWriter, WarehouseReader, WriteReport};
pub use frame::DataFrame;
pub use job::{load_job, load_job_from_str, run_job, JobDefinition, JobReport};
pub use session::{Secret, Session, SessionConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
