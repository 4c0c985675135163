//! Connector options
//!
//! Option names are matched case-insensitively. Values are kept verbatim and
//! never logged, since `url` may carry a password.

use crate::error::{Error, Result};
use crate::types::parse_bool;
use crate::warehouse::{JdbcUrl, SourceQuery, TableName};
use std::collections::BTreeMap;

/// Short name of the warehouse connector format
pub const FORMAT: &str = "sqldw";

/// Fully qualified name accepted for the same format
pub const FORMAT_ALIAS: &str = "com.databricks.spark.sqldw";

pub const OPT_URL: &str = "url";
pub const OPT_TEMP_DIR: &str = "tempDir";
pub const OPT_DB_TABLE: &str = "dbTable";
pub const OPT_QUERY: &str = "query";
pub const OPT_FORWARD_CREDENTIALS: &str = "forward_spark_azure_storage_credentials";
pub const OPT_PRE_ACTIONS: &str = "preActions";
pub const OPT_POST_ACTIONS: &str = "postActions";
pub const OPT_CONFIRM_OVERWRITE: &str = "confirmOverwrite";

const KNOWN_OPTIONS: &[&str] = &[
    OPT_URL,
    OPT_TEMP_DIR,
    OPT_DB_TABLE,
    OPT_QUERY,
    OPT_FORWARD_CREDENTIALS,
    OPT_PRE_ACTIONS,
    OPT_POST_ACTIONS,
    OPT_CONFIRM_OVERWRITE,
];

/// Whether `format` names the warehouse connector
pub fn is_supported_format(format: &str) -> bool {
    let format = format.trim();
    format.eq_ignore_ascii_case(FORMAT) || format.eq_ignore_ascii_case(FORMAT_ALIAS)
}

/// Check an optional format name, `None` meaning the connector's own
pub fn check_format(format: Option<&str>) -> Result<()> {
    match format {
        Some(f) if !is_supported_format(f) => Err(Error::invalid_value(
            "format",
            format!("unsupported format '{f}', expected '{FORMAT}' or '{FORMAT_ALIAS}'"),
        )),
        _ => Ok(()),
    }
}

/// Raw options keyed by lowercased name
#[derive(Clone, Default)]
pub struct OptionMap {
    entries: BTreeMap<String, (String, String)>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option; a later value for the same name wins
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()));
    }

    /// Value of an option, ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Value of a required, non-blank option
    fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::missing_field(key))
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key).map_or(Ok(false), |v| parse_bool(key, v))
    }

    /// Option names as given by the caller that the connector does not use
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(lower, _)| !KNOWN_OPTIONS.iter().any(|k| k.eq_ignore_ascii_case(lower)))
            .map(|(_, (key, _))| key.as_str())
            .collect()
    }

    fn warn_unknown(&self) {
        for key in self.unknown_keys() {
            tracing::warn!(option = %key, "Ignoring unknown connector option");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for OptionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.entries.values().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("OptionMap").field("keys", &keys).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

/// Split a `;`-separated statement list, dropping blanks
fn split_statements(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Options common to reads and writes
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub url: JdbcUrl,
    pub temp_dir: String,
    pub forward_credentials: bool,
}

impl ConnectionOptions {
    fn parse(options: &OptionMap) -> Result<Self> {
        Ok(Self {
            url: JdbcUrl::parse(options.require(OPT_URL)?)?,
            temp_dir: options.require(OPT_TEMP_DIR)?.trim().to_string(),
            forward_credentials: options.get_bool(OPT_FORWARD_CREDENTIALS)?,
        })
    }
}

/// Validated options for a read
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub connection: ConnectionOptions,
    pub source: SourceQuery,
}

impl ReadOptions {
    /// Validate options for a read; exactly one of `dbTable` and `query` is required
    pub fn parse(options: &OptionMap) -> Result<Self> {
        options.warn_unknown();
        let connection = ConnectionOptions::parse(options)?;

        let table = options.get(OPT_DB_TABLE).filter(|v| !v.trim().is_empty());
        let query = options.get(OPT_QUERY).filter(|v| !v.trim().is_empty());
        let source = match (table, query) {
            (Some(table), None) => SourceQuery::Table(TableName::parse(table)?),
            (None, Some(query)) => SourceQuery::Query(query.to_string()),
            (Some(_), Some(_)) => {
                return Err(Error::config(format!(
                    "Options '{OPT_DB_TABLE}' and '{OPT_QUERY}' are mutually exclusive"
                )))
            }
            (None, None) => {
                return Err(Error::config(format!(
                    "One of '{OPT_DB_TABLE}' or '{OPT_QUERY}' is required"
                )))
            }
        };

        Ok(Self { connection, source })
    }
}

/// Validated options for a write
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub connection: ConnectionOptions,
    pub table: TableName,
    pub pre_actions: Vec<String>,
    pub post_actions: Vec<String>,
    pub confirm_overwrite: bool,
}

impl WriteOptions {
    /// Validate options for a write; `dbTable` is required and `query` rejected
    pub fn parse(options: &OptionMap) -> Result<Self> {
        options.warn_unknown();
        if options.get(OPT_QUERY).is_some() {
            return Err(Error::config(format!(
                "Option '{OPT_QUERY}' is not supported when writing"
            )));
        }

        Ok(Self {
            connection: ConnectionOptions::parse(options)?,
            table: TableName::parse(options.require(OPT_DB_TABLE)?)?,
            pre_actions: split_statements(options.get(OPT_PRE_ACTIONS)),
            post_actions: split_statements(options.get(OPT_POST_ACTIONS)),
            confirm_overwrite: options.get_bool(OPT_CONFIRM_OVERWRITE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn base() -> OptionMap {
        [
            ("url", "jdbc:duckdb::memory:"),
            ("tempDir", "memory://tempDirs"),
            ("forward_spark_azure_storage_credentials", "true"),
        ]
        .into_iter()
        .collect()
    }

    #[test_case("sqldw", true)]
    #[test_case("SQLDW", true)]
    #[test_case("com.databricks.spark.sqldw", true)]
    #[test_case("parquet", false)]
    fn test_is_supported_format(format: &str, expected: bool) {
        assert_eq!(is_supported_format(format), expected);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut options = base();
        options.set("DBTABLE", "dbo.DimProduct");
        options.set("tempdir", "memory://other");

        let read = ReadOptions::parse(&options).unwrap();
        assert_eq!(read.connection.temp_dir, "memory://other");
        assert!(read.connection.forward_credentials);
        assert_eq!(read.source.describe(), "dbo.DimProduct");
    }

    #[test]
    fn test_read_requires_exactly_one_source() {
        assert!(ReadOptions::parse(&base()).is_err());

        let mut options = base();
        options.set("dbTable", "t");
        options.set("query", "SELECT 1");
        assert!(ReadOptions::parse(&options).is_err());

        let mut options = base();
        options.set("query", "SELECT 1");
        assert!(matches!(
            ReadOptions::parse(&options).unwrap().source,
            SourceQuery::Query(_)
        ));
    }

    #[test]
    fn test_missing_required() {
        let options: OptionMap = [("dbTable", "t"), ("url", "jdbc:duckdb::memory:")]
            .into_iter()
            .collect();
        let err = ReadOptions::parse(&options).unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { ref field } if field == "tempDir"));
    }

    #[test]
    fn test_write_options() {
        let mut options = base();
        options.set("dbTable", "fromDB");
        options.set("preActions", "DELETE FROM audit; ; INSERT INTO audit VALUES (1)");
        options.set("confirmOverwrite", "yes");

        let write = WriteOptions::parse(&options).unwrap();
        assert_eq!(write.table.name(), "fromDB");
        assert_eq!(
            write.pre_actions,
            vec!["DELETE FROM audit".to_string(), "INSERT INTO audit VALUES (1)".to_string()]
        );
        assert!(write.post_actions.is_empty());
        assert!(write.confirm_overwrite);
    }

    #[test]
    fn test_write_rejects_query() {
        let mut options = base();
        options.set("dbTable", "t");
        options.set("query", "SELECT 1");
        assert!(WriteOptions::parse(&options).is_err());
    }

    #[test]
    fn test_invalid_forward_flag() {
        let mut options = base();
        options.set("forward_spark_azure_storage_credentials", "maybe");
        options.set("dbTable", "t");
        assert!(matches!(
            ReadOptions::parse(&options),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_and_debug() {
        let mut options = base();
        options.set("maxStrLength", "4000");
        assert_eq!(options.unknown_keys(), vec!["maxStrLength"]);

        let debug = format!("{options:?}");
        assert!(debug.contains("maxStrLength"));
        assert!(!debug.contains("memory://tempDirs"));
    }
}
