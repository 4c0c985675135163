//! Session configuration
//!
//! An immutable key/value map built once and shared by every reader and
//! writer of a session.

use crate::error::{Error, Result};
use crate::types::parse_bool;
use std::collections::BTreeMap;
use std::fmt;

/// Controls the Parquet layout used when staging dataframes for a write
pub const LEGACY_PARQUET_FORMAT: &str = "spark.sql.parquet.writeLegacyFormat";

/// Prefix of the account-scoped blob storage key option
pub const STORAGE_ACCOUNT_KEY_PREFIX: &str = "fs.azure.account.key.";

/// Suffix of the account-scoped blob storage key option
pub const STORAGE_ACCOUNT_KEY_SUFFIX: &str = ".blob.core.windows.net";

const REDACTED: &str = "****";

/// Build the session option holding the access key of `account`
pub fn storage_account_key_option(account: &str) -> String {
    format!("{STORAGE_ACCOUNT_KEY_PREFIX}{account}{STORAGE_ACCOUNT_KEY_SUFFIX}")
}

/// A secret string that never shows up in `Debug` or `Display` output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Immutable session configuration
#[derive(Clone, Default)]
pub struct SessionConfig {
    entries: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Start building a configuration
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Read a configuration value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether a key has been set
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether staged Parquet files use the legacy layout
    pub fn legacy_parquet_format(&self) -> bool {
        // Validated in `build`, so a stored value always parses
        self.get(LEGACY_PARQUET_FORMAT)
            .and_then(|v| parse_bool(LEGACY_PARQUET_FORMAT, v).ok())
            .unwrap_or(false)
    }

    /// Access key for a blob storage account, if configured
    pub fn storage_account_key(&self, account: &str) -> Option<Secret> {
        self.get(&storage_account_key_option(account))
            .map(Secret::new)
    }

    /// Iterate over entries with secret values replaced
    pub fn redacted_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| {
            if is_secret_key(k) {
                (k.as_str(), REDACTED)
            } else {
                (k.as_str(), v.as_str())
            }
        })
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.redacted_entries()).finish()
    }
}

/// Whether a configuration key holds a secret
pub fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with(STORAGE_ACCOUNT_KEY_PREFIX)
        || lower.contains("password")
        || lower.contains("secret")
        || lower
            .split('.')
            .any(|segment| matches!(segment, "sas" | "sastoken" | "sas_token"))
}

/// Builder for [`SessionConfig`]
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    entries: BTreeMap<String, String>,
}

impl SessionConfigBuilder {
    /// Set an arbitrary option; later calls for the same key win
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Set many options at once
    #[must_use]
    pub fn configs<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.entries.insert(k.into(), v.into());
        }
        self
    }

    /// Emit the legacy Parquet layout when staging writes
    #[must_use]
    pub fn legacy_parquet_format(self, enabled: bool) -> Self {
        self.config(LEGACY_PARQUET_FORMAT, enabled.to_string())
    }

    /// Grant access to a blob storage account
    #[must_use]
    pub fn storage_account_key(self, account: &str, key: &Secret) -> Self {
        self.config(storage_account_key_option(account), key.expose())
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<SessionConfig> {
        for (key, value) in &self.entries {
            if key.trim().is_empty() {
                return Err(Error::config("Session option names cannot be empty"));
            }
            if key == LEGACY_PARQUET_FORMAT {
                parse_bool(key, value)?;
            }
            if key.starts_with(STORAGE_ACCOUNT_KEY_PREFIX) {
                let account = key
                    .strip_prefix(STORAGE_ACCOUNT_KEY_PREFIX)
                    .and_then(|rest| rest.strip_suffix(STORAGE_ACCOUNT_KEY_SUFFIX))
                    .unwrap_or_default();
                if account.is_empty() {
                    return Err(Error::invalid_value(
                        key,
                        format!("expected {STORAGE_ACCOUNT_KEY_PREFIX}<account>{STORAGE_ACCOUNT_KEY_SUFFIX}"),
                    ));
                }
                if value.trim().is_empty() {
                    return Err(Error::invalid_value(key, "storage key is empty"));
                }
            }
        }

        Ok(SessionConfig {
            entries: self.entries,
        })
    }
}
