//! Session handle

use crate::connector::{decode_parts, WarehouseReader};
use crate::error::Result;
use crate::frame::DataFrame;
use crate::session::config::SessionConfig;
use crate::warehouse::{self, JdbcUrl, SourceQuery};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for reads, writes and ad hoc queries
///
/// Cloning is cheap; every clone shares the same immutable configuration.
#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<SessionConfig>,
}

impl Session {
    /// Create a session over a built configuration
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a read through the warehouse connector
    pub fn read(&self) -> WarehouseReader {
        WarehouseReader::new(self.clone())
    }

    /// Single Int64 `id` column holding `start..end` by `step`, bound to this session
    pub fn range(&self, start: i64, end: i64, step: i64) -> Result<DataFrame> {
        Ok(DataFrame::range(start, end, step)?.with_session(self.clone()))
    }

    /// Run a free-form query directly against the warehouse
    ///
    /// No staging area is involved: the result is unloaded to a local scratch
    /// directory and decoded from there.
    pub async fn sql(&self, url: &str, query: &str) -> Result<DataFrame> {
        let url = JdbcUrl::parse(url)?;
        let warehouse = warehouse::connect(&url)?;
        info!(warehouse = %url.redacted(), "Running ad hoc query");
        debug!(sql = %query, "Query text");

        let scratch = tempfile::tempdir()?;
        let files = warehouse
            .unload(&SourceQuery::Query(query.to_string()), scratch.path())
            .await?;

        let mut parts = Vec::with_capacity(files.len());
        for file in &files {
            parts.push(Bytes::from(tokio::fs::read(file).await?));
        }

        let (schema, batches) = decode_parts(parts)?;
        Ok(DataFrame::new(schema, batches)?.with_session(self.clone()))
    }
}
