//! Job types
//!
//! Declarative job definition types for YAML parsing.

use crate::connector::{
    FORMAT, OPT_CONFIRM_OVERWRITE, OPT_DB_TABLE, OPT_FORWARD_CREDENTIALS, OPT_POST_ACTIONS,
    OPT_PRE_ACTIONS, OPT_QUERY, OPT_TEMP_DIR, OPT_URL,
};
use crate::error::{Error, Result};
use crate::session::SessionConfig;
use crate::types::{JsonValue, WriteMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Job Definition
// ============================================================================

/// Top-level job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobDefinition {
    /// Job name
    pub name: String,
    /// Session options, applied before anything else
    #[serde(default)]
    pub session: BTreeMap<String, JsonValue>,
    /// Warehouse connection and staging
    pub warehouse: WarehouseDefinition,
    /// Read step
    #[serde(default)]
    pub read: Option<ReadDefinition>,
    /// Write step
    #[serde(default)]
    pub write: Option<WriteDefinition>,
    /// Template variables (`{{ vars.name }}`)
    #[serde(default)]
    pub vars: JsonValue,
}

impl JobDefinition {
    /// Build the session configuration from the `session` block
    ///
    /// Booleans and numbers are accepted and stored in their string form.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut builder = SessionConfig::builder();
        for (key, value) in &self.session {
            let value = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Number(n) => n.to_string(),
                _ => {
                    return Err(Error::invalid_value(
                        key,
                        "session values must be strings, booleans or numbers",
                    ))
                }
            };
            builder = builder.config(key, value);
        }
        builder.build()
    }
}

// ============================================================================
// Warehouse Definition
// ============================================================================

/// Warehouse connection shared by the read and write steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WarehouseDefinition {
    /// JDBC-style connection URL
    pub url: String,
    /// Staging location in blob storage
    pub temp_dir: String,
    /// Require the session's storage account key for staging
    #[serde(default = "default_true")]
    pub forward_storage_credentials: bool,
    /// Connector format
    #[serde(default = "default_format")]
    pub format: String,
}

impl WarehouseDefinition {
    /// Connector options shared by reads and writes
    pub fn connector_options(&self) -> Vec<(&'static str, String)> {
        vec![
            (OPT_URL, self.url.clone()),
            (OPT_TEMP_DIR, self.temp_dir.clone()),
            (
                OPT_FORWARD_CREDENTIALS,
                self.forward_storage_credentials.to_string(),
            ),
        ]
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    FORMAT.to_string()
}

// ============================================================================
// Read Definition
// ============================================================================

/// Read step: exactly one of `table` and `query`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReadDefinition {
    /// Table to load in full
    #[serde(default)]
    pub table: Option<String>,
    /// Free-form SELECT to load
    #[serde(default)]
    pub query: Option<String>,
}

impl ReadDefinition {
    /// Connector options selecting the source
    pub fn connector_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(table) = &self.table {
            options.push((OPT_DB_TABLE, table.clone()));
        }
        if let Some(query) = &self.query {
            options.push((OPT_QUERY, query.clone()));
        }
        options
    }
}

// ============================================================================
// Write Definition
// ============================================================================

/// Write step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WriteDefinition {
    /// Destination table
    pub table: String,
    /// How to treat an existing table
    #[serde(default)]
    pub mode: WriteMode,
    /// Allow `overwrite` to replace an existing table
    #[serde(default)]
    pub confirm_overwrite: bool,
    /// SQL run before the load, in the same transaction
    #[serde(default)]
    pub pre_actions: Vec<String>,
    /// SQL run after the load, in the same transaction
    #[serde(default)]
    pub post_actions: Vec<String>,
    /// Rows to write
    pub source: WriteSource,
}

impl WriteDefinition {
    /// Connector options for the destination
    pub fn connector_options(&self) -> Vec<(&'static str, String)> {
        let mut options = vec![(OPT_DB_TABLE, self.table.clone())];
        if !self.pre_actions.is_empty() {
            options.push((OPT_PRE_ACTIONS, self.pre_actions.join(";")));
        }
        if !self.post_actions.is_empty() {
            options.push((OPT_POST_ACTIONS, self.post_actions.join(";")));
        }
        if self.confirm_overwrite {
            options.push((OPT_CONFIRM_OVERWRITE, "true".to_string()));
        }
        options
    }
}

/// Where the written rows come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSource {
    /// Integer sequence in a single column
    Range(RangeSource),
    /// The frame produced by the read step
    Read,
}

/// Integer sequence `start..end` by `step`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RangeSource {
    #[serde(default)]
    pub start: i64,
    pub end: i64,
    #[serde(default = "default_step")]
    pub step: i64,
    /// Name of the single column
    #[serde(default = "default_column")]
    pub column: String,
}

fn default_step() -> i64 {
    1
}

fn default_column() -> String {
    "value".to_string()
}
