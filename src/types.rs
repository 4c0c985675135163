//! Common types used throughout sqldw-bridge
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// Write Mode
// ============================================================================

/// How a dataframe is written to an existing destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum WriteMode {
    /// Replace the table's contents wholesale
    Overwrite,
    /// Insert rows after the existing ones
    Append,
    /// Fail if the table already exists
    #[default]
    ErrorIfExists,
    /// Do nothing if the table already exists
    Ignore,
}

impl WriteMode {
    /// True for modes that destroy existing rows
    pub fn is_destructive(self) -> bool {
        matches!(self, WriteMode::Overwrite)
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "append" => Ok(WriteMode::Append),
            "error" | "errorifexists" | "error_if_exists" => Ok(WriteMode::ErrorIfExists),
            "ignore" => Ok(WriteMode::Ignore),
            other => Err(Error::invalid_value(
                "mode",
                format!("unknown write mode '{other}'"),
            )),
        }
    }
}

impl TryFrom<String> for WriteMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "overwrite"),
            WriteMode::Append => write!(f, "append"),
            WriteMode::ErrorIfExists => write!(f, "error_if_exists"),
            WriteMode::Ignore => write!(f, "ignore"),
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Parse a boolean flag the way session options spell them
pub fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::invalid_value(
            field,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_default() {
        assert_eq!(WriteMode::default(), WriteMode::ErrorIfExists);
    }

    #[test]
    fn test_write_mode_from_str() {
        assert_eq!("overwrite".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
        assert_eq!("Append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("error".parse::<WriteMode>().unwrap(), WriteMode::ErrorIfExists);
        assert_eq!(
            "ErrorIfExists".parse::<WriteMode>().unwrap(),
            WriteMode::ErrorIfExists
        );
        assert_eq!("IGNORE".parse::<WriteMode>().unwrap(), WriteMode::Ignore);
        assert!("truncate".parse::<WriteMode>().is_err());
    }

    #[test]
    fn test_write_mode_serde() {
        let mode: WriteMode = serde_json::from_str("\"overwrite\"").unwrap();
        assert_eq!(mode, WriteMode::Overwrite);

        let mode: WriteMode = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(mode, WriteMode::ErrorIfExists);

        let mode: WriteMode = serde_json::from_str("\"errorifexists\"").unwrap();
        assert_eq!(mode, WriteMode::ErrorIfExists);

        let mode: WriteMode = serde_json::from_str("\"Overwrite\"").unwrap();
        assert_eq!(mode, WriteMode::Overwrite);

        assert!(serde_json::from_str::<WriteMode>("\"truncate\"").is_err());

        let json = serde_json::to_string(&WriteMode::ErrorIfExists).unwrap();
        assert_eq!(json, "\"error_if_exists\"");
    }

    #[test]
    fn test_is_destructive() {
        assert!(WriteMode::Overwrite.is_destructive());
        assert!(!WriteMode::Append.is_destructive());
        assert!(!WriteMode::Ignore.is_destructive());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("flag", "true").unwrap());
        assert!(parse_bool("flag", " TRUE ").unwrap());
        assert!(!parse_bool("flag", "false").unwrap());
        assert!(!parse_bool("flag", "0").unwrap());
        assert!(parse_bool("flag", "maybe").is_err());
    }
}
