//! DuckDB-backed warehouse
//!
//! Native DuckDB files are opened directly; PostgreSQL, MySQL and SQLite are
//! attached through DuckDB extensions and made the default catalog. Unloads
//! use `COPY ... TO ... (FORMAT PARQUET)` and loads read staged Parquet files
//! with `read_parquet`, both inside DuckDB.

use crate::error::{Error, Result};
use crate::types::WriteMode;
use crate::warehouse::table::{quote_ident, quote_literal, TableName};
use crate::warehouse::url::{JdbcUrl, WarehouseKind};
use async_trait::async_trait;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Catalog alias for attached databases
const ATTACHED_CATALOG: &str = "warehouse";

/// Identifiers resolve case-insensitively, so the catalog lookup does too
const TABLE_EXISTS_SQL: &str = "SELECT count(*) FROM information_schema.tables
     WHERE table_catalog = current_database()
       AND lower(table_schema) = lower(coalesce(?, current_schema()))
       AND lower(table_name) = lower(?)";

/// What to unload from the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceQuery {
    /// Every row of a table
    Table(TableName),
    /// Free-form SELECT
    Query(String),
}

impl SourceQuery {
    /// SQL producing the source rows
    pub fn to_sql(&self) -> String {
        match self {
            SourceQuery::Table(table) => format!("SELECT * FROM {}", table.quoted()),
            SourceQuery::Query(query) => query.trim().trim_end_matches(';').to_string(),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            SourceQuery::Table(table) => table.to_string(),
            SourceQuery::Query(_) => "<query>".to_string(),
        }
    }
}

/// A bulk load of staged Parquet files into a table
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Destination table
    pub table: TableName,
    /// Local Parquet files to load
    pub files: Vec<PathBuf>,
    /// How to treat an existing table
    pub mode: WriteMode,
    /// Statements run before the load, in the same transaction
    pub pre_actions: Vec<String>,
    /// Statements run after the load, in the same transaction
    pub post_actions: Vec<String>,
}

/// Outcome of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Rows inserted
    pub rows: u64,
    /// False when `Ignore` found an existing table
    pub applied: bool,
}

/// Bulk operations a warehouse backend provides
#[async_trait]
pub trait Warehouse: Send + Sync + std::fmt::Debug {
    /// Backend flavour
    fn kind(&self) -> WarehouseKind;

    /// Run a trivial query to verify the connection
    async fn check_connection(&self) -> Result<()>;

    /// Fully qualified names of user tables
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Whether `table` exists
    async fn table_exists(&self, table: &TableName) -> Result<bool>;

    /// Write the rows of `source` as Parquet files under `dir`
    async fn unload(&self, source: &SourceQuery, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Load Parquet files into a table in one transaction
    async fn load(&self, request: LoadRequest) -> Result<LoadOutcome>;
}

/// Warehouse reached through an embedded DuckDB connection
#[derive(Debug)]
pub struct DuckDbWarehouse {
    conn: Arc<Mutex<Connection>>,
    kind: WarehouseKind,
    /// Connection description with the password masked
    description: String,
}

impl DuckDbWarehouse {
    /// Open or attach the warehouse named by `url`
    pub fn connect(url: &JdbcUrl) -> Result<Self> {
        Self::open(url, false)
    }

    /// Open the warehouse without allowing writes
    ///
    /// A database file that does not exist yet is treated as an empty
    /// warehouse and is not created.
    pub fn connect_read_only(url: &JdbcUrl) -> Result<Self> {
        Self::open(url, true)
    }

    fn open(url: &JdbcUrl, read_only: bool) -> Result<Self> {
        let missing_file = read_only && url.path().is_some_and(|p| p != ":memory:" && !Path::new(p).exists());

        let conn = match url.kind() {
            _ if missing_file => Connection::open_in_memory()
                .map_err(|e| Error::warehouse(format!("Failed to create DuckDB connection: {e}")))?,
            WarehouseKind::DuckDb => match url.path() {
                Some(":memory:") | None => Connection::open_in_memory(),
                Some(path) if read_only => duckdb::Config::default()
                    .access_mode(duckdb::AccessMode::ReadOnly)
                    .and_then(|config| Connection::open_with_flags(path, config)),
                Some(path) => Connection::open(path),
            }
            .map_err(|e| Error::warehouse(format!("Failed to open DuckDB database: {e}")))?,
            WarehouseKind::Postgres | WarehouseKind::Mysql | WarehouseKind::Sqlite => {
                let conn = Connection::open_in_memory().map_err(|e| {
                    Error::warehouse(format!("Failed to create DuckDB connection: {e}"))
                })?;
                Self::attach(&conn, url, read_only)?;
                conn
            }
            WarehouseKind::SqlServer => {
                return Err(Error::UnsupportedWarehouse {
                    kind: url.kind().to_string(),
                    message: format!("{} is not reachable through DuckDB", url.redacted()),
                })
            }
        };

        tracing::debug!(warehouse = %url.redacted(), read_only, "Connected to warehouse");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            kind: url.kind(),
            description: url.redacted(),
        })
    }

    /// Attach an external database and make it the default catalog
    fn attach(conn: &Connection, url: &JdbcUrl, read_only: bool) -> Result<()> {
        let (extension, attach_type) = match url.kind() {
            WarehouseKind::Postgres => ("postgres", "POSTGRES"),
            WarehouseKind::Mysql => ("mysql", "MYSQL"),
            WarehouseKind::Sqlite => ("sqlite", "SQLITE"),
            other => {
                return Err(Error::warehouse(format!(
                    "{other} databases cannot be attached"
                )))
            }
        };

        conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};"))
            .map_err(|e| Error::warehouse(format!("Failed to load {extension} extension: {e}")))?;

        let access = if read_only { ", READ_ONLY" } else { "" };
        let attach_sql = format!(
            "ATTACH {} AS {ATTACHED_CATALOG} (TYPE {attach_type}{access}); USE {ATTACHED_CATALOG};",
            quote_literal(&url.connection_target())
        );
        conn.execute_batch(&attach_sql).map_err(|e| {
            Error::warehouse(format!("Failed to attach {}: {e}", url.redacted()))
        })?;

        Ok(())
    }

    /// Run blocking DuckDB work off the async runtime
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::warehouse("warehouse connection lock poisoned"))?;
            f(&mut *guard)
        })
        .await?
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn kind(&self) -> WarehouseKind {
        self.kind
    }

    async fn check_connection(&self) -> Result<()> {
        self.run(|conn| {
            conn.query_row(
                "SELECT count(*) FROM information_schema.tables WHERE table_catalog = current_database()",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| Error::warehouse(format!("Connection check failed: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT table_schema || '.' || table_name
                 FROM information_schema.tables
                 WHERE table_catalog = current_database()
                   AND table_schema NOT IN ('information_schema', 'pg_catalog')
                 ORDER BY table_schema, table_name",
            )?;
            let tables = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tables)
        })
        .await
    }

    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        let schema = table.schema().map(String::from);
        let name = table.name().to_string();

        self.run(move |conn| {
            let count: i64 =
                conn.query_row(TABLE_EXISTS_SQL, duckdb::params![schema, name], |row| row.get(0))?;
            Ok(count > 0)
        })
        .await
    }

    async fn unload(&self, source: &SourceQuery, dir: &Path) -> Result<Vec<PathBuf>> {
        let query = source.to_sql();
        let target = dir.join("part-00000.parquet");
        let target_str = target
            .to_str()
            .ok_or_else(|| Error::warehouse("Invalid unload path"))?
            .to_string();

        tracing::debug!(
            warehouse = %self.description,
            source = %source.describe(),
            path = %target_str,
            "Unloading to Parquet"
        );

        self.run(move |conn| {
            let copy_sql = format!(
                "COPY ({query}) TO {} (FORMAT PARQUET, COMPRESSION 'SNAPPY');",
                quote_literal(&target_str)
            );
            conn.execute_batch(&copy_sql)
                .map_err(|e| Error::warehouse(format!("Unload failed: {e}")))?;
            Ok(vec![target])
        })
        .await
    }

    async fn load(&self, request: LoadRequest) -> Result<LoadOutcome> {
        if request.files.is_empty() {
            return Err(Error::warehouse(format!(
                "No staged files to load into {}",
                request.table
            )));
        }

        tracing::debug!(
            warehouse = %self.description,
            table = %request.table,
            files = request.files.len(),
            "Loading into warehouse"
        );
        self.run(move |conn| load_in_transaction(conn, &request)).await
    }
}

fn load_in_transaction(conn: &mut Connection, request: &LoadRequest) -> Result<LoadOutcome> {
    let files = request
        .files
        .iter()
        .map(|path| {
            path.to_str()
                .map(quote_literal)
                .ok_or_else(|| Error::warehouse(format!("Invalid staged path {}", path.display())))
        })
        .collect::<Result<Vec<_>>>()?;
    let source = format!("read_parquet([{}])", files.join(", "));
    let table = request.table.quoted();

    // Dropping the transaction without commit rolls everything back
    let tx = conn.transaction()?;

    for action in &request.pre_actions {
        tracing::debug!(sql = %action, "Running pre-action");
        tx.execute_batch(action)
            .map_err(|e| Error::warehouse(format!("Pre-action failed: {e}")))?;
    }

    if let Some(schema) = request.table.schema() {
        tx.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {};", quote_ident(schema)))?;
    }

    let count: i64 = tx.query_row(
        TABLE_EXISTS_SQL,
        duckdb::params![request.table.schema(), request.table.name()],
        |row| row.get(0),
    )?;
    let exists = count > 0;

    let statement = match (request.mode, exists) {
        (WriteMode::Ignore, true) => None,
        (WriteMode::ErrorIfExists, true) => {
            return Err(Error::TableExists {
                table: request.table.to_string(),
            })
        }
        (WriteMode::Overwrite, true) => Some(format!(
            "DROP TABLE {table}; CREATE TABLE {table} AS SELECT * FROM {source};"
        )),
        (WriteMode::Append, true) => {
            Some(format!("INSERT INTO {table} BY NAME SELECT * FROM {source};"))
        }
        (_, false) => Some(format!("CREATE TABLE {table} AS SELECT * FROM {source};")),
    };

    let Some(statement) = statement else {
        return Ok(LoadOutcome {
            rows: 0,
            applied: false,
        });
    };

    tracing::debug!(sql = %statement, "Loading staged files");
    tx.execute_batch(&statement)
        .map_err(|e| Error::warehouse(format!("Load into {} failed: {e}", request.table)))?;

    let rows: i64 = tx.query_row(&format!("SELECT count(*) FROM {source}"), [], |row| {
        row.get(0)
    })?;

    for action in &request.post_actions {
        tracing::debug!(sql = %action, "Running post-action");
        tx.execute_batch(action)
            .map_err(|e| Error::warehouse(format!("Post-action failed: {e}")))?;
    }

    tx.commit()?;

    Ok(LoadOutcome {
        rows: u64::try_from(rows).unwrap_or_default(),
        applied: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn memory_warehouse() -> DuckDbWarehouse {
        DuckDbWarehouse::connect(&JdbcUrl::parse("jdbc:duckdb::memory:").unwrap()).unwrap()
    }

    async fn exec(wh: &DuckDbWarehouse, sql: &'static str) {
        wh.run(move |conn| Ok(conn.execute_batch(sql)?)).await.unwrap();
    }

    async fn count(wh: &DuckDbWarehouse, table: &'static str) -> i64 {
        wh.run(move |conn| {
            Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?)
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_source_query_sql() {
        let table = SourceQuery::Table(TableName::parse("dbo.DimProduct").unwrap());
        assert_eq!(table.to_sql(), "SELECT * FROM \"dbo\".\"DimProduct\"");

        let query = SourceQuery::Query("SELECT 1;".to_string());
        assert_eq!(query.to_sql(), "SELECT 1");
        assert_eq!(query.describe(), "<query>");
    }

    #[test]
    fn test_sqlserver_is_not_a_duckdb_target() {
        let url = JdbcUrl::parse("jdbc:sqlserver://dw:1433;database=db;password=pw").unwrap();
        let err = DuckDbWarehouse::connect(&url).unwrap_err();
        assert!(matches!(err, Error::UnsupportedWarehouse { .. }));
        assert!(!err.to_string().contains("pw;"));
    }

    #[tokio::test]
    async fn test_table_exists_and_list() {
        let wh = memory_warehouse();
        exec(&wh, "CREATE SCHEMA dbo; CREATE TABLE dbo.t (x INTEGER);").await;

        assert!(wh.table_exists(&TableName::parse("dbo.t").unwrap()).await.unwrap());
        assert!(!wh.table_exists(&TableName::parse("dbo.u").unwrap()).await.unwrap());
        assert_eq!(wh.list_tables().await.unwrap(), vec!["dbo.t".to_string()]);
        wh.check_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_table_exists_ignores_case() {
        let wh = memory_warehouse();
        exec(&wh, "CREATE SCHEMA dbo; CREATE TABLE dbo.fromDB (value BIGINT);").await;

        assert!(wh.table_exists(&TableName::parse("DBO.FROMDB").unwrap()).await.unwrap());
        assert!(wh.table_exists(&TableName::parse("[dbo].[fromdb]").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_only_leaves_missing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.duckdb");
        let url = JdbcUrl::parse(&format!("jdbc:duckdb:{}", path.display())).unwrap();

        let wh = DuckDbWarehouse::connect_read_only(&url).unwrap();
        assert!(!wh.table_exists(&TableName::parse("t").unwrap()).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let url = JdbcUrl::parse(&format!("jdbc:duckdb:{}", dir.path().join("dw.duckdb").display())).unwrap();
        let wh = DuckDbWarehouse::connect(&url).unwrap();
        exec(&wh, "CREATE TABLE t (x INTEGER);").await;
        drop(wh);

        let wh = DuckDbWarehouse::connect_read_only(&url).unwrap();
        assert!(wh.table_exists(&TableName::parse("T").unwrap()).await.unwrap());
        let result = wh.run(|conn| Ok(conn.execute_batch("CREATE TABLE u (x INTEGER);")?)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_overwrite_under_different_case() {
        let wh = memory_warehouse();
        exec(&wh, "CREATE SCHEMA dbo; CREATE TABLE dbo.fromDB AS SELECT 42 AS value;").await;
        exec(&wh, "CREATE TABLE src AS SELECT range AS value FROM range(5);").await;

        let dir = tempfile::tempdir().unwrap();
        let files = wh
            .unload(&SourceQuery::Table(TableName::parse("src").unwrap()), dir.path())
            .await
            .unwrap();
        let outcome = wh
            .load(LoadRequest {
                table: TableName::parse("dbo.FROMDB").unwrap(),
                files,
                mode: WriteMode::Overwrite,
                pre_actions: vec![],
                post_actions: vec![],
            })
            .await
            .unwrap();

        assert_eq!(outcome.rows, 5);
        assert_eq!(count(&wh, "dbo.fromDB").await, 5);
    }

    #[tokio::test]
    async fn test_unload_then_load_modes() {
        let wh = memory_warehouse();
        exec(&wh, "CREATE TABLE src AS SELECT range AS value FROM range(5);").await;

        let dir = tempfile::tempdir().unwrap();
        let files = wh
            .unload(&SourceQuery::Table(TableName::parse("src").unwrap()), dir.path())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);

        let request = |mode| LoadRequest {
            table: TableName::parse("dbo.dst").unwrap(),
            files: files.clone(),
            mode,
            pre_actions: vec![],
            post_actions: vec![],
        };

        let outcome = wh.load(request(WriteMode::ErrorIfExists)).await.unwrap();
        assert_eq!(outcome, LoadOutcome { rows: 5, applied: true });

        let err = wh.load(request(WriteMode::ErrorIfExists)).await.unwrap_err();
        assert!(matches!(err, Error::TableExists { .. }));

        let outcome = wh.load(request(WriteMode::Ignore)).await.unwrap();
        assert!(!outcome.applied);
        assert_eq!(count(&wh, "dbo.dst").await, 5);

        wh.load(request(WriteMode::Append)).await.unwrap();
        assert_eq!(count(&wh, "dbo.dst").await, 10);

        wh.load(request(WriteMode::Overwrite)).await.unwrap();
        assert_eq!(count(&wh, "dbo.dst").await, 5);
    }

    #[tokio::test]
    async fn test_failed_post_action_rolls_back() {
        let wh = memory_warehouse();
        exec(&wh, "CREATE TABLE src AS SELECT 1 AS value;").await;
        exec(&wh, "CREATE TABLE dst AS SELECT 42 AS value;").await;

        let dir = tempfile::tempdir().unwrap();
        let files = wh
            .unload(&SourceQuery::Query("SELECT * FROM src".to_string()), dir.path())
            .await
            .unwrap();

        let result = wh
            .load(LoadRequest {
                table: TableName::parse("dst").unwrap(),
                files,
                mode: WriteMode::Overwrite,
                pre_actions: vec![],
                post_actions: vec!["SELECT * FROM missing_table".to_string()],
            })
            .await;
        assert!(result.is_err());

        let value: i32 = wh
            .run(|conn| Ok(conn.query_row("SELECT value FROM dst", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
