//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bulk read/write bridge between a SQL data warehouse and dataframes
#[derive(Parser, Debug)]
#[command(name = "sqldw-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job definition file (YAML)
    #[arg(short, long, global = true)]
    pub job: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the job: configure the session, read, then write
    Run {
        /// Report what the write would do without changing the warehouse
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a read and print the rows
    Read {
        /// Table to read instead of the job's read step
        #[arg(long, conflicts_with = "query")]
        table: Option<String>,

        /// Query to read instead of the job's read step
        #[arg(long)]
        query: Option<String>,

        /// Maximum rows to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run an ad hoc query directly against the warehouse (no staging)
    Query {
        /// SQL to run
        #[arg(long)]
        sql: String,

        /// Maximum rows to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Test the warehouse connection and staging credentials
    Check,

    /// Show the resolved session configuration (secrets redacted)
    Config,

    /// Validate the job definition
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["sqldw-bridge", "--job", "job.yaml", "run", "--dry-run"]);
        assert_eq!(cli.job, Some(PathBuf::from("job.yaml")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Run { dry_run: true }));
    }

    #[test]
    fn test_parse_query_with_global_flags_after() {
        let cli = Cli::parse_from([
            "sqldw-bridge",
            "query",
            "--sql",
            "SELECT * FROM fromDB",
            "-j",
            "job.yaml",
            "--format",
            "pretty",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Pretty);
        assert!(matches!(cli.command, Commands::Query { ref sql, limit: None } if sql == "SELECT * FROM fromDB"));
    }

    #[test]
    fn test_read_table_conflicts_with_query() {
        let result = Cli::try_parse_from([
            "sqldw-bridge",
            "read",
            "--table",
            "t",
            "--query",
            "SELECT 1",
        ]);
        assert!(result.is_err());
    }
}
