//! Session module
//!
//! A session owns the immutable configuration every data movement depends
//! on. Readers, writers and ad hoc queries are only reachable through a
//! [`Session`], so configuration always precedes them.
//!
//! # Overview
//!
//! - `SessionConfig` - Validated, immutable key/value options
//! - `Session` - Entry point for reads, writes and queries

mod config;
mod context;

pub use config::{
    is_secret_key, storage_account_key_option, Secret, SessionConfig, SessionConfigBuilder,
    LEGACY_PARQUET_FORMAT, STORAGE_ACCOUNT_KEY_PREFIX, STORAGE_ACCOUNT_KEY_SUFFIX,
};
pub use context::Session;
