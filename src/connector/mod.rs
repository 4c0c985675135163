//! Warehouse connector
//!
//! Reads and writes between dataframes and the warehouse, staged as Parquet
//! files in blob storage.
//!
//! # Overview
//!
//! - `WarehouseReader` - `session.read().format("sqldw").option(..).load()`
//! - `DataFrameWriter` - `df.write().format("sqldw").option(..).mode(..).save()`
//! - `OptionMap` - Case-insensitive connector options
//!
//! # Options
//!
//! | Option | Read | Write | Meaning |
//! |--------|------|-------|---------|
//! | `url` | required | required | Warehouse connection URL |
//! | `tempDir` | required | required | Staging location in blob storage |
//! | `dbTable` | one of | required | `schema.table` to read or write |
//! | `query` | one of | rejected | Free-form SELECT to read |
//! | `forward_spark_azure_storage_credentials` | optional | optional | Require the session's account key |
//! | `preActions` / `postActions` | - | optional | `;`-separated SQL run in the load transaction |
//! | `confirmOverwrite` | - | optional | Allow `Overwrite` mode |

mod options;
mod reader;
mod writer;

pub use options::{
    is_supported_format, ConnectionOptions, OptionMap, ReadOptions, WriteOptions, FORMAT, FORMAT_ALIAS,
    OPT_CONFIRM_OVERWRITE, OPT_DB_TABLE, OPT_FORWARD_CREDENTIALS, OPT_POST_ACTIONS,
    OPT_PRE_ACTIONS, OPT_QUERY, OPT_TEMP_DIR, OPT_URL,
};
pub use reader::WarehouseReader;
pub use writer::{DataFrameWriter, WriteReport};

pub(crate) use reader::decode_parts;
