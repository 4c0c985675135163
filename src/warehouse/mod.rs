//! Warehouse module
//!
//! Connection URLs, table references and the bulk load/unload backends.
//!
//! # Overview
//!
//! - `JdbcUrl` - Parsed connection URL with password redaction
//! - `TableName` - `schema.table` references rendered as quoted identifiers
//! - `Warehouse` - Bulk operations a backend provides
//! - `DuckDbWarehouse` - DuckDB backend (native files, PostgreSQL, MySQL, SQLite)
//! - `SqlServerWarehouse` - SQL Server / Azure SQL Data Warehouse over TDS

mod engine;
mod sqlserver;
mod table;
mod url;

pub use engine::{DuckDbWarehouse, LoadOutcome, LoadRequest, SourceQuery, Warehouse};
pub use sqlserver::SqlServerWarehouse;
pub use table::{bracket_ident, quote_ident, quote_literal, TableName};
pub use url::{JdbcUrl, WarehouseKind};

use crate::error::Result;
use std::sync::Arc;

/// Connect to the warehouse named by `url`
pub fn connect(url: &JdbcUrl) -> Result<Arc<dyn Warehouse>> {
    match url.kind() {
        WarehouseKind::SqlServer => Ok(Arc::new(SqlServerWarehouse::connect(url)?)),
        _ => Ok(Arc::new(DuckDbWarehouse::connect(url)?)),
    }
}

/// Connect for inspection only; nothing is created or modified
pub fn connect_read_only(url: &JdbcUrl) -> Result<Arc<dyn Warehouse>> {
    match url.kind() {
        WarehouseKind::SqlServer => Ok(Arc::new(SqlServerWarehouse::connect(url)?)),
        _ => Ok(Arc::new(DuckDbWarehouse::connect_read_only(url)?)),
    }
}
