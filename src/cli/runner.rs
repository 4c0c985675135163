//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::error::{Error, Result};
use crate::frame::DataFrame;
use crate::job::{self, build_session, load_job, read_step, JobDefinition, ReadDefinition, RunOptions};
use crate::staging::{StagingArea, StagingLocation};
use crate::warehouse::{self, JdbcUrl};
use serde_json::{json, Map, Value};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { dry_run } => self.run_job(*dry_run).await,
            Commands::Read {
                table,
                query,
                limit,
            } => self.read(table.as_deref(), query.as_deref(), *limit).await,
            Commands::Query { sql, limit } => self.query(sql, *limit).await,
            Commands::Check => self.check().await,
            Commands::Config => self.config(),
            Commands::Validate => self.validate(),
        }
    }

    /// Load job definition
    fn load_job(&self) -> Result<JobDefinition> {
        let path = self
            .cli
            .job
            .as_ref()
            .ok_or_else(|| Error::config("Job file not specified (use -j flag)"))?;
        load_job(path)
    }

    /// Run every step of the job
    async fn run_job(&self, dry_run: bool) -> Result<()> {
        let def = self.load_job()?;
        let report = job::run_job(&def, RunOptions { dry_run }).await?;

        self.output_message(&json!({
            "type": "REPORT",
            "report": report
        }));
        Ok(())
    }

    /// Read through the connector and print the rows
    async fn read(&self, table: Option<&str>, query: Option<&str>, limit: Option<usize>) -> Result<()> {
        let def = self.load_job()?;
        let read = match (table, query) {
            (None, None) => def
                .read
                .clone()
                .ok_or_else(|| Error::config("Job has no read step; pass --table or --query"))?,
            (table, query) => ReadDefinition {
                table: table.map(String::from),
                query: query.map(String::from),
            },
        };

        let session = build_session(&def)?;
        let df = read_step(&session, &def, &read).await?;
        self.output_frame(&df, limit)
    }

    /// Run an ad hoc query against the job's warehouse
    async fn query(&self, sql: &str, limit: Option<usize>) -> Result<()> {
        let def = self.load_job()?;
        let session = build_session(&def)?;
        let df = session.sql(&def.warehouse.url, sql).await?;
        self.output_frame(&df, limit)
    }

    /// Check staging credentials and the warehouse connection
    async fn check(&self) -> Result<()> {
        let def = self.load_job()?;
        let session = build_session(&def)?;
        let url = JdbcUrl::parse(&def.warehouse.url)?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("Checking connection to {}", url.redacted())
            }
        }));

        let staging = StagingArea::open(
            &def.warehouse.temp_dir,
            session.config(),
            def.warehouse.forward_storage_credentials,
        );
        let account = StagingLocation::parse(&def.warehouse.temp_dir)
            .ok()
            .and_then(|location| location.account().map(String::from));
        let staging_status = match &staging {
            Ok(area) => json!({ "status": "SUCCEEDED", "scheme": area.scheme(), "account": account }),
            Err(e) => json!({ "status": "FAILED", "message": e.to_string(), "account": account }),
        };

        let overall = if staging.is_ok() { "SUCCEEDED" } else { "FAILED" };
        let status = match check_warehouse(&url).await {
            Ok(tables) => json!({
                "status": overall,
                "message": format!("Connection successful ({tables} tables visible)"),
                "staging": staging_status
            }),
            Err(e) => json!({
                "status": "FAILED",
                "message": format!("Connection failed: {e}"),
                "staging": staging_status
            }),
        };

        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": status
        }));
        Ok(())
    }

    /// Show the resolved session configuration
    fn config(&self) -> Result<()> {
        let def = self.load_job()?;
        let config = def.session_config()?;

        let entries: Map<String, Value> = config
            .redacted_entries()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        self.output_message(&json!({
            "type": "CONFIG",
            "config": entries
        }));
        Ok(())
    }

    /// Validate job definition
    fn validate(&self) -> Result<()> {
        let def = self.load_job()?;

        let steps: Vec<&str> = [
            def.read.as_ref().map(|_| "read"),
            def.write.as_ref().map(|_| "write"),
        ]
        .into_iter()
        .flatten()
        .collect();

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Job '{}' is valid with steps: {}",
                    def.name,
                    steps.join(", ")
                )
            }
        }));
        Ok(())
    }

    /// Print dataframe rows
    fn output_frame(&self, df: &DataFrame, limit: Option<usize>) -> Result<()> {
        let shown = match limit {
            Some(n) => df.limit(n),
            None => df.clone(),
        };

        match self.cli.format {
            OutputFormat::Json => {
                for row in shown.to_json_rows()? {
                    self.output_message(&json!({ "type": "RECORD", "record": row }));
                }
            }
            OutputFormat::Pretty => println!("{}", shown.to_pretty_string()?),
        }

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!("{} rows, columns: {}", df.num_rows(), df.columns().join(", "))
            }
        }));
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Connect, run a trivial query and count visible tables
async fn check_warehouse(url: &JdbcUrl) -> Result<usize> {
    let warehouse = warehouse::connect(url)?;
    warehouse.check_connection().await?;
    Ok(warehouse.list_tables().await?.len())
}
