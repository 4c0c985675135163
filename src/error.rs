//! Error types for sqldw-bridge
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for sqldw-bridge
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required option: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // Staging Errors
    // ============================================================================
    #[error("No storage credential configured for account '{account}'")]
    MissingStorageCredential { account: String },

    #[error("Staging error: {message}")]
    Staging { message: String },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    // ============================================================================
    // Warehouse Errors
    // ============================================================================
    #[error("Warehouse error: {message}")]
    Warehouse { message: String },

    #[error("Unsupported warehouse '{kind}': {message}")]
    UnsupportedWarehouse { kind: String, message: String },

    #[error("Table '{table}' already exists")]
    TableExists { table: String },

    #[error("Refusing to overwrite '{table}' without confirmation")]
    OverwriteNotConfirmed { table: String },

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("DataFrame error: {message}")]
    Frame { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Create a staging error
    pub fn staging(message: impl Into<String>) -> Self {
        Self::Staging {
            message: message.into(),
        }
    }

    /// Create a warehouse error
    pub fn warehouse(message: impl Into<String>) -> Self {
        Self::Warehouse {
            message: message.into(),
        }
    }

    /// Create a dataframe error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// True when the error happened before anything reached the warehouse
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Error::MissingStorageCredential { .. } | Error::ObjectStore(_) | Error::Staging { .. }
        )
    }
}

/// Result type alias for sqldw-bridge
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("dbTable");
        assert_eq!(err.to_string(), "Missing required option: dbTable");

        let err = Error::OverwriteNotConfirmed {
            table: "dbo.fromDB".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Refusing to overwrite 'dbo.fromDB' without confirmation"
        );
    }

    #[test]
    fn test_is_credential_error() {
        assert!(Error::MissingStorageCredential {
            account: "acct".to_string()
        }
        .is_credential_error());
        assert!(Error::staging("bad key").is_credential_error());

        assert!(!Error::warehouse("boom").is_credential_error());
        assert!(!Error::config("test").is_credential_error());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
