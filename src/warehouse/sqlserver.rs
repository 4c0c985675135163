//! SQL Server / Azure SQL Data Warehouse backend
//!
//! Talks TDS through `tiberius`. The connection is opened on first use so
//! that building the backend never touches the network. Unloads turn a
//! result set into Arrow and write it as Parquet; loads read staged Parquet
//! files and insert them with batched `INSERT ... VALUES` statements inside
//! one transaction.

use crate::error::{Error, Result};
use crate::staging::{decode_parquet, encode_batches, part_file_name, ParquetWriterConfig};
use crate::types::WriteMode;
use crate::warehouse::engine::{LoadOutcome, LoadRequest, SourceQuery, Warehouse};
use crate::warehouse::table::{bracket_ident, quote_literal, TableName};
use crate::warehouse::url::{JdbcUrl, WarehouseKind};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiberius::{AuthMethod, Client, Column, ColumnData, ColumnType, Config, FromSql, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type SqlClient = Client<Compat<TcpStream>>;

/// Most rows SQL Server accepts in one `VALUES` list
const MAX_INSERT_ROWS: usize = 1000;

/// Warehouse reached over TDS
pub struct SqlServerWarehouse {
    config: Config,
    client: Mutex<Option<SqlClient>>,
    /// Connection description with the password masked
    description: String,
}

impl fmt::Debug for SqlServerWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerWarehouse")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl SqlServerWarehouse {
    /// Prepare a connection to the server named by `url`
    pub fn connect(url: &JdbcUrl) -> Result<Self> {
        Ok(Self {
            config: client_config(url)?,
            client: Mutex::new(None),
            description: url.redacted(),
        })
    }

    /// Server address, `host:port`
    pub fn address(&self) -> String {
        self.config.get_addr()
    }

    async fn open(&self) -> Result<SqlClient> {
        let client = match open_client(self.config.clone()).await {
            // Azure gateways redirect to the node that serves the database
            Err(Error::SqlServer(tiberius::error::Error::Routing { host, port })) => {
                tracing::debug!(host = %host, port, "Following server redirect");
                let mut config = self.config.clone();
                config.host(&host);
                config.port(port);
                open_client(config).await?
            }
            other => other?,
        };
        tracing::debug!(warehouse = %self.description, "Connected to warehouse");
        Ok(client)
    }

    /// Lock the connection, opening it first if needed
    async fn session(&self) -> Result<tokio::sync::MutexGuard<'_, Option<SqlClient>>> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(guard)
    }
}

fn client_config(url: &JdbcUrl) -> Result<Config> {
    let host = url
        .host()
        .ok_or_else(|| Error::invalid_value("url", "sqlserver URL has no host"))?;

    let mut config = Config::new();
    config.host(host);
    config.port(url.port().unwrap_or(1433));
    config.application_name(crate::NAME);
    if let Some(database) = url.database() {
        config.database(database);
    }

    match (url.user(), url.password()) {
        (Some(user), Some(password)) => {
            config.authentication(AuthMethod::sql_server(user, password.expose()));
        }
        _ => {
            return Err(Error::invalid_value(
                "url",
                "sqlserver URL needs user and password",
            ))
        }
    }

    if url
        .property("trustServerCertificate")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        config.trust_cert();
    }

    Ok(config)
}

async fn open_client(config: Config) -> Result<SqlClient> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| Error::warehouse(format!("Failed to reach {}: {e}", config.get_addr())))?;
    tcp.set_nodelay(true)?;
    Ok(Client::connect(config, tcp.compat_write()).await?)
}

fn connected(guard: &mut Option<SqlClient>) -> Result<&mut SqlClient> {
    guard
        .as_mut()
        .ok_or_else(|| Error::warehouse("warehouse connection is not open"))
}

/// Run statements whose results are not needed
async fn exec(client: &mut SqlClient, sql: impl Into<String>) -> Result<()> {
    client.simple_query(sql.into()).await?.into_results().await?;
    Ok(())
}

#[async_trait]
impl Warehouse for SqlServerWarehouse {
    fn kind(&self) -> WarehouseKind {
        WarehouseKind::SqlServer
    }

    async fn check_connection(&self) -> Result<()> {
        let mut guard = self.session().await?;
        let client = connected(&mut guard)?;
        client
            .simple_query("SELECT 1")
            .await?
            .into_row()
            .await
            .map_err(|e| Error::warehouse(format!("Connection check failed: {e}")))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut guard = self.session().await?;
        let client = connected(&mut guard)?;
        let rows = client
            .simple_query(
                "SELECT TABLE_SCHEMA + '.' + TABLE_NAME FROM INFORMATION_SCHEMA.TABLES
                 WHERE TABLE_TYPE = 'BASE TABLE'
                 ORDER BY TABLE_SCHEMA, TABLE_NAME",
            )
            .await?
            .into_first_result()
            .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<&str, _>(0)?.unwrap_or_default().to_string()))
            .collect()
    }

    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        let mut guard = self.session().await?;
        let client = connected(&mut guard)?;
        table_exists(client, table).await
    }

    async fn unload(&self, source: &SourceQuery, dir: &Path) -> Result<Vec<PathBuf>> {
        let query = source_sql(source);
        let target = dir.join(part_file_name(0));
        tracing::debug!(
            warehouse = %self.description,
            source = %source.describe(),
            path = %target.display(),
            "Unloading to Parquet"
        );

        let mut guard = self.session().await?;
        let client = connected(&mut guard)?;
        let mut stream = client
            .simple_query(query)
            .await
            .map_err(|e| Error::warehouse(format!("Unload failed: {e}")))?;
        let columns = stream
            .columns()
            .await?
            .map(<[Column]>::to_vec)
            .unwrap_or_default();
        let rows = stream.into_first_result().await?;

        let batch = rows_to_batch(&columns, rows)?;
        let data = encode_batches(&batch.schema(), &[batch], &ParquetWriterConfig::new())?;
        tokio::fs::write(&target, &data).await?;
        Ok(vec![target])
    }

    async fn load(&self, request: LoadRequest) -> Result<LoadOutcome> {
        let mut schema: Option<SchemaRef> = None;
        let mut batches = Vec::new();
        for file in &request.files {
            let (file_schema, file_batches) = decode_parquet(Bytes::from(tokio::fs::read(file).await?))?;
            schema.get_or_insert(file_schema);
            batches.extend(file_batches);
        }
        let schema = schema.ok_or_else(|| {
            Error::warehouse(format!("No staged files to load into {}", request.table))
        })?;

        tracing::debug!(
            warehouse = %self.description,
            table = %request.table,
            files = request.files.len(),
            "Loading into warehouse"
        );

        let mut guard = self.session().await?;
        let client = connected(&mut guard)?;

        exec(client, "SET XACT_ABORT ON; BEGIN TRANSACTION;").await?;
        match load_rows(client, &request, &schema, &batches).await {
            Ok(outcome) => {
                exec(client, "COMMIT TRANSACTION;").await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = exec(client, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;").await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn table_exists(client: &mut SqlClient, table: &TableName) -> Result<bool> {
    let count = client
        .simple_query(table_exists_sql(table))
        .await?
        .into_row()
        .await?
        .and_then(|row| row.try_get::<i32, _>(0).ok().flatten())
        .unwrap_or_default();
    Ok(count > 0)
}

fn table_exists_sql(table: &TableName) -> String {
    let schema = table
        .schema()
        .map_or_else(|| "SCHEMA_NAME()".to_string(), nliteral);
    format!(
        "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES
         WHERE LOWER(TABLE_SCHEMA) = LOWER({schema})
           AND LOWER(TABLE_NAME) = LOWER({})",
        nliteral(table.name())
    )
}

async fn load_rows(
    client: &mut SqlClient,
    request: &LoadRequest,
    schema: &Schema,
    batches: &[RecordBatch],
) -> Result<LoadOutcome> {
    let table = request.table.bracketed();

    for action in &request.pre_actions {
        tracing::debug!(sql = %action, "Running pre-action");
        exec(client, action.as_str())
            .await
            .map_err(|e| Error::warehouse(format!("Pre-action failed: {e}")))?;
    }

    if let Some(schema_name) = request.table.schema() {
        exec(client, create_schema_sql(schema_name)).await?;
    }

    let exists = table_exists(client, &request.table).await?;
    match (request.mode, exists) {
        (WriteMode::Ignore, true) => {
            return Ok(LoadOutcome {
                rows: 0,
                applied: false,
            })
        }
        (WriteMode::ErrorIfExists, true) => {
            return Err(Error::TableExists {
                table: request.table.to_string(),
            })
        }
        (WriteMode::Overwrite, true) => {
            exec(client, format!("DROP TABLE {table};")).await?;
            exec(client, create_table_sql(&table, schema)).await?;
        }
        (WriteMode::Append, true) => {}
        (_, false) => exec(client, create_table_sql(&table, schema)).await?,
    }

    let mut rows = 0u64;
    for statement in insert_statements(&table, schema, batches)? {
        exec(client, statement)
            .await
            .map_err(|e| Error::warehouse(format!("Load into {} failed: {e}", request.table)))?;
    }
    for batch in batches {
        rows += batch.num_rows() as u64;
    }

    for action in &request.post_actions {
        tracing::debug!(sql = %action, "Running post-action");
        exec(client, action.as_str())
            .await
            .map_err(|e| Error::warehouse(format!("Post-action failed: {e}")))?;
    }

    Ok(LoadOutcome {
        rows,
        applied: true,
    })
}

fn source_sql(source: &SourceQuery) -> String {
    match source {
        SourceQuery::Table(table) => format!("SELECT * FROM {}", table.bracketed()),
        SourceQuery::Query(query) => query.trim().trim_end_matches(';').to_string(),
    }
}

fn nliteral(value: &str) -> String {
    format!("N{}", quote_literal(value))
}

fn create_schema_sql(schema: &str) -> String {
    format!(
        "IF SCHEMA_ID({}) IS NULL EXEC({});",
        nliteral(schema),
        nliteral(&format!("CREATE SCHEMA {}", bracket_ident(schema)))
    )
}

fn create_table_sql(table: &str, schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| {
            let null = if field.is_nullable() { "NULL" } else { "NOT NULL" };
            format!(
                "{} {} {null}",
                bracket_ident(field.name()),
                sql_type(field.data_type())
            )
        })
        .collect();
    format!("CREATE TABLE {table} ({});", columns.join(", "))
}

/// Column type used when creating a table from an Arrow field
fn sql_type(data_type: &DataType) -> String {
    match data_type {
        DataType::Boolean => "BIT".to_string(),
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => "SMALLINT".to_string(),
        DataType::Int32 | DataType::UInt16 => "INT".to_string(),
        DataType::Int64 | DataType::UInt32 => "BIGINT".to_string(),
        DataType::UInt64 => "DECIMAL(20, 0)".to_string(),
        DataType::Float16 | DataType::Float32 => "REAL".to_string(),
        DataType::Float64 => "FLOAT".to_string(),
        DataType::Decimal128(precision, scale) => format!("DECIMAL({precision}, {scale})"),
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Timestamp(_, None) => "DATETIME2".to_string(),
        DataType::Timestamp(_, Some(_)) => "DATETIMEOFFSET".to_string(),
        DataType::Binary | DataType::LargeBinary => "VARBINARY(8000)".to_string(),
        _ => "NVARCHAR(4000)".to_string(),
    }
}

fn insert_statements(table: &str, schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<String>> {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| bracket_ident(f.name()))
        .collect();
    let prefix = format!("INSERT INTO {table} ({}) VALUES ", columns.join(", "));
    let options = FormatOptions::default();

    let mut statements = Vec::new();
    for batch in batches {
        let formatters = batch
            .columns()
            .iter()
            .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let rows: Vec<String> = (0..batch.num_rows())
            .map(|row| {
                let values: Vec<String> = batch
                    .columns()
                    .iter()
                    .zip(&formatters)
                    .map(|(array, formatter)| sql_literal(array, formatter, row))
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();

        for chunk in rows.chunks(MAX_INSERT_ROWS) {
            statements.push(format!("{prefix}{};", chunk.join(", ")));
        }
    }
    Ok(statements)
}

/// Render one cell as a T-SQL literal
fn sql_literal(array: &ArrayRef, formatter: &ArrayFormatter<'_>, row: usize) -> String {
    if array.is_null(row) {
        return "NULL".to_string();
    }

    match array.data_type() {
        DataType::Boolean => String::from(if array.as_boolean().value(row) { "1" } else { "0" }),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Decimal128(_, _) => formatter.value(row).to_string(),
        DataType::Float32 => float_literal(f64::from(array.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => float_literal(array.as_primitive::<Float64Type>().value(row)),
        DataType::Binary => hex_literal(array.as_binary::<i32>().value(row)),
        DataType::LargeBinary => hex_literal(array.as_binary::<i64>().value(row)),
        _ => nliteral(&formatter.value(row).to_string()),
    }
}

fn float_literal(value: f64) -> String {
    if value.is_finite() {
        format!("{value:e}")
    } else {
        "NULL".to_string()
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Arrow type a result column is read into
fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => DataType::Boolean,
        ColumnType::Int1
        | ColumnType::Int2
        | ColumnType::Int4
        | ColumnType::Int8
        | ColumnType::Intn => DataType::Int64,
        ColumnType::Float4
        | ColumnType::Float8
        | ColumnType::Floatn
        | ColumnType::Money
        | ColumnType::Money4
        | ColumnType::Decimaln
        | ColumnType::Numericn => DataType::Float64,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => DataType::Binary,
        _ => DataType::Utf8,
    }
}

enum ColumnBuilder {
    Bool(BooleanBuilder),
    Int(Int64Builder),
    Float(Float64Builder),
    Binary(BinaryBuilder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn new(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Bool(BooleanBuilder::new()),
            DataType::Int64 => Self::Int(Int64Builder::new()),
            DataType::Float64 => Self::Float(Float64Builder::new()),
            DataType::Binary => Self::Binary(BinaryBuilder::new()),
            _ => Self::Text(StringBuilder::new()),
        }
    }

    fn append(&mut self, name: &str, value: &ColumnData<'static>) -> Result<()> {
        match self {
            Self::Bool(b) => b.append_option(match value {
                ColumnData::Bit(v) => *v,
                other => return Err(mismatch(name, other)),
            }),
            Self::Int(b) => b.append_option(match value {
                ColumnData::U8(v) => v.map(i64::from),
                ColumnData::I16(v) => v.map(i64::from),
                ColumnData::I32(v) => v.map(i64::from),
                ColumnData::I64(v) => *v,
                other => return Err(mismatch(name, other)),
            }),
            Self::Float(b) => b.append_option(match value {
                ColumnData::F32(v) => v.map(f64::from),
                ColumnData::F64(v) => *v,
                ColumnData::Numeric(v) => v
                    .as_ref()
                    .map(|n| n.value() as f64 / 10f64.powi(i32::from(n.scale()))),
                ColumnData::I64(v) => v.map(|n| n as f64),
                ColumnData::I32(v) => v.map(f64::from),
                other => return Err(mismatch(name, other)),
            }),
            Self::Binary(b) => match value {
                ColumnData::Binary(v) => b.append_option(v.as_deref()),
                other => return Err(mismatch(name, other)),
            },
            Self::Text(b) => b.append_option(text_value(name, value)?),
        }
        Ok(())
    }

    fn finish(self) -> ArrayRef {
        match self {
            Self::Bool(mut b) => Arc::new(b.finish()),
            Self::Int(mut b) => Arc::new(b.finish()),
            Self::Float(mut b) => Arc::new(b.finish()),
            Self::Binary(mut b) => Arc::new(b.finish()),
            Self::Text(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Text rendering for strings, identifiers and temporal values
fn text_value(name: &str, value: &ColumnData<'static>) -> Result<Option<String>> {
    Ok(match value {
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(ToString::to_string),
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(value)?.map(|d| d.to_string()),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(value)?.map(|t| t.to_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(value)?.map(|t| t.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        ColumnData::DateTimeOffset(_) => {
            chrono::DateTime::<chrono::FixedOffset>::from_sql(value)?.map(|t| t.to_rfc3339())
        }
        other => return Err(mismatch(name, other)),
    })
}

fn mismatch(name: &str, value: &ColumnData<'static>) -> Error {
    Error::warehouse(format!("Unsupported value in column '{name}': {value:?}"))
}

fn rows_to_batch(columns: &[Column], rows: Vec<Row>) -> Result<RecordBatch> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c.name(), arrow_type(c.column_type()), true))
        .collect();
    let mut builders: Vec<ColumnBuilder> = fields
        .iter()
        .map(|f| ColumnBuilder::new(f.data_type()))
        .collect();

    for row in rows {
        for ((value, builder), field) in row.into_iter().zip(&mut builders).zip(&fields) {
            builder.append(field.name(), &value)?;
        }
    }

    let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}
