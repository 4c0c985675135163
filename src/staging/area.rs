//! Blob storage staging areas (Azure Blob, local filesystem, in-memory)

use crate::error::{Error, Result};
use crate::session::{Secret, SessionConfig};
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

const AZURE_BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Where staged files live, parsed from the `tempDir` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingLocation {
    /// `wasbs://container@account.blob.core.windows.net/prefix`
    AzureBlob {
        account: String,
        container: String,
        prefix: String,
    },
    /// `az://container/prefix`, account from the environment
    AzureContainer { container: String, prefix: String },
    /// `file:///path` or a plain path
    Local { path: String },
    /// `memory://prefix`, process-local
    Memory { prefix: String },
}

impl StagingLocation {
    /// Parse a staging URL
    ///
    /// Supported formats:
    /// - `wasbs://container@account.blob.core.windows.net/path` - Azure Blob (also `wasb://`)
    /// - `az://container/path` - Azure Blob, account from `AZURE_STORAGE_ACCOUNT_NAME`
    /// - `memory://path` - In-memory store
    /// - `/local/path`, `./path` or `file:///path` - Local filesystem
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::missing_field("tempDir"));
        }

        if raw.starts_with("wasbs://") || raw.starts_with("wasb://") {
            Self::parse_wasb(raw)
        } else if let Some(rest) = raw.strip_prefix("az://") {
            let (container, prefix) = split_first_segment(rest);
            if container.is_empty() {
                return Err(Error::invalid_value("tempDir", "az:// URL has no container"));
            }
            Ok(Self::AzureContainer { container, prefix })
        } else if let Some(rest) = raw.strip_prefix("memory://") {
            Ok(Self::Memory {
                prefix: rest.trim_matches('/').to_string(),
            })
        } else {
            let path = raw.strip_prefix("file://").unwrap_or(raw);
            Ok(Self::Local {
                path: path.to_string(),
            })
        }
    }

    fn parse_wasb(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        let container = url.username().to_string();
        if container.is_empty() {
            return Err(Error::invalid_value(
                "tempDir",
                "expected wasbs://<container>@<account>.blob.core.windows.net/<path>",
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_value("tempDir", "staging URL has no host"))?;
        let account = host
            .strip_suffix(AZURE_BLOB_HOST_SUFFIX)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                Error::invalid_value(
                    "tempDir",
                    format!("'{host}' is not a blob storage endpoint"),
                )
            })?
            .to_string();

        Ok(Self::AzureBlob {
            account,
            container,
            prefix: url.path().trim_matches('/').to_string(),
        })
    }

    /// Storage account, when the URL names one
    pub fn account(&self) -> Option<&str> {
        match self {
            StagingLocation::AzureBlob { account, .. } => Some(account),
            _ => None,
        }
    }
}

/// Split `container/rest/of/path` into its first segment and the remainder
fn split_first_segment(s: &str) -> (String, String) {
    match s.find('/') {
        Some(idx) => (
            s[..idx].to_string(),
            s[idx + 1..].trim_matches('/').to_string(),
        ),
        None => (s.to_string(), String::new()),
    }
}

/// Per-operation directory inside a staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRun {
    path: ObjectPath,
}

impl StagingRun {
    /// Object path of the run directory
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Object path of a file inside the run directory
    pub fn child(&self, name: &str) -> ObjectPath {
        self.path.child(name)
    }
}

/// A blob storage location with credentials resolved
#[derive(Debug, Clone)]
pub struct StagingArea {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    scheme: &'static str,
}

impl StagingArea {
    /// Open the staging area for `temp_dir`
    ///
    /// Azure accounts are authenticated with the session's account key. When
    /// `forward_credentials` is set that key is mandatory; otherwise a missing
    /// key falls back to credentials from the environment.
    pub fn open(temp_dir: &str, config: &SessionConfig, forward_credentials: bool) -> Result<Self> {
        match StagingLocation::parse(temp_dir)? {
            StagingLocation::AzureBlob {
                account,
                container,
                prefix,
            } => {
                let key = config.storage_account_key(&account);
                if key.is_none() && forward_credentials {
                    return Err(Error::MissingStorageCredential { account });
                }
                Self::azure(&account, &container, prefix, key.as_ref())
            }
            StagingLocation::AzureContainer { container, prefix } => {
                let store = MicrosoftAzureBuilder::from_env()
                    .with_container_name(&container)
                    .build()
                    .map_err(|e| Error::staging(format!("Failed to create Azure client: {e}")))?;
                Ok(Self {
                    store: Arc::new(store),
                    prefix,
                    scheme: "az",
                })
            }
            StagingLocation::Local { path } => {
                std::fs::create_dir_all(&path).map_err(|e| {
                    Error::staging(format!("Failed to create directory {path}: {e}"))
                })?;
                let store = LocalFileSystem::new_with_prefix(&path)
                    .map_err(|e| Error::staging(format!("Failed to create local store: {e}")))?;
                Ok(Self {
                    store: Arc::new(store),
                    prefix: String::new(),
                    scheme: "file",
                })
            }
            StagingLocation::Memory { prefix } => Ok(Self::with_store(Arc::new(InMemory::new()), prefix)),
        }
    }

    fn azure(
        account: &str,
        container: &str,
        prefix: String,
        key: Option<&Secret>,
    ) -> Result<Self> {
        let builder = match key {
            Some(key) => MicrosoftAzureBuilder::new().with_access_key(key.expose()),
            None => MicrosoftAzureBuilder::from_env(),
        };

        // An invalid key is rejected here, before anything is transferred
        let store = builder
            .with_account(account)
            .with_container_name(container)
            .build()
            .map_err(|e| {
                Error::staging(format!(
                    "Failed to create Azure client for account '{account}': {e}"
                ))
            })?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "wasbs",
        })
    }

    /// Wrap an existing object store
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            scheme: "memory",
        }
    }

    /// Whether this is a remote store (not local or in-memory)
    pub fn is_cloud(&self) -> bool {
        !matches!(self.scheme, "file" | "memory")
    }

    /// Get the scheme (wasbs, az, file, memory)
    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// Allocate a fresh run directory: `{prefix}/{timestamp}-{id}`
    pub fn new_run(&self) -> StagingRun {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let now = Utc::now();
        let name = format!(
            "{}-{:x}{:04x}",
            now.format("%Y-%m-%d_%H-%M-%S"),
            now.timestamp_subsec_nanos(),
            COUNTER.fetch_add(1, Ordering::Relaxed) & 0xffff
        );

        let path = if self.prefix.is_empty() {
            ObjectPath::from(name)
        } else {
            ObjectPath::from(format!("{}/{name}", self.prefix))
        };
        StagingRun { path }
    }

    /// Write one object into a run directory
    pub async fn put(&self, run: &StagingRun, name: &str, data: Bytes) -> Result<String> {
        let path = run.child(name);
        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| Error::staging(format!("Failed to stage {path}: {e}")))?;

        Ok(format!("{}://{path}", self.scheme))
    }

    /// Objects in a run directory, sorted by path
    pub async fn list(&self, run: &StagingRun) -> Result<Vec<ObjectPath>> {
        let mut paths: Vec<ObjectPath> = self
            .store
            .list(Some(run.path()))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;
        paths.sort();
        Ok(paths)
    }

    /// Read one staged object
    pub async fn get(&self, path: &ObjectPath) -> Result<Bytes> {
        let data = self
            .store
            .get(path)
            .await
            .map_err(|e| Error::staging(format!("Failed to read staged {path}: {e}")))?
            .bytes()
            .await?;
        Ok(data)
    }

    /// Delete everything in a run directory, returning the number of objects removed
    pub async fn cleanup(&self, run: &StagingRun) -> Result<usize> {
        let paths = self.list(run).await?;
        for path in &paths {
            self.store.delete(path).await?;
        }
        Ok(paths.len())
    }
}
