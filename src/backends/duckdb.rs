//! DuckDB backend implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::RecordBatch;
use arrow::datatypes::{DataType, Schema};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::DuckDbConfig;
use crate::dialect::{DuckDbDialect, ExplainMode};
use crate::error::{CoreError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::explain::{parse_duckdb_explain, ExplainResult, IndexInfo};
use crate::schema_cache::{ForeignKey, TableSchema};

use super::BackendConnection;

/// DuckDB connection implementing the unified backend trait.
#[derive(Clone)]
pub struct DuckDbConnection {
    database_path: PathBuf,
    dialect: DuckDbDialect,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
}

impl DuckDbConnection {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, DuckDbConfig::default())
    }

    /// Create a DuckDB connection with configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: DuckDbConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), max_concurrency = config.max_concurrency, "creating DuckDB connection");
        Self {
            database_path: path,
            dialect: DuckDbDialect,
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure maximum concurrent executions; callers can tune based on hardware.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight));
        self
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>> {
        let available = self.limiter.available_permits();
        if available == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter.acquire().await.map_err(|e| CoreError::Other(anyhow::anyhow!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path.display(), "opening new DuckDB connection");
        Ok(duckdb::Connection::open(self.database_path.clone())?)
    }

    /// Register an Arrow table in DuckDB by creating a table from schema and appending batches.
    pub async fn register_arrow_table(&self, table_name: &str, schema: &Schema, batches: Vec<RecordBatch>) -> Result<()> {
        let table_name = table_name.to_string();
        let schema = schema.clone();
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<duckdb::Connection> {
            let start = Instant::now();
            let create_sql = arrow_schema_to_create_table(&table_name, &schema);
            tracing::debug!(sql = %create_sql, "creating table from Arrow schema");
            conn.execute(&create_sql, [])?;

            {
                let mut appender = conn.appender(&table_name)?;
                for batch in batches {
                    appender.append_record_batch(batch)?;
                }
            }

            tracing::debug!(table = table_name.as_str(), ms = start.elapsed().as_millis(), "registered Arrow table in DuckDB");
            Ok(conn)
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?;

        let conn = result?;
        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        Ok(())
    }
}

/// Convert Arrow schema to DuckDB CREATE TABLE statement.
fn arrow_schema_to_create_table(table_name: &str, schema: &Schema) -> String {
    let columns: Vec<String> =
        schema.fields().iter().map(|f| format!("\"{}\" {}", f.name(), arrow_type_to_duckdb(f.data_type()))).collect();
    format!("CREATE TABLE \"{}\" ({})", table_name, columns.join(", "))
}

/// Map Arrow data types to DuckDB types.
fn arrow_type_to_duckdb(dt: &DataType) -> &'static str {
    match dt {
        DataType::Boolean => "BOOLEAN",
        DataType::Int8 => "TINYINT",
        DataType::Int16 => "SMALLINT",
        DataType::Int32 => "INTEGER",
        DataType::Int64 => "BIGINT",
        DataType::UInt8 => "UTINYINT",
        DataType::UInt16 => "USMALLINT",
        DataType::UInt32 => "UINTEGER",
        DataType::UInt64 => "UBIGINT",
        DataType::Float16 | DataType::Float32 => "FLOAT",
        DataType::Float64 => "DOUBLE",
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR",
        DataType::Binary | DataType::LargeBinary => "BLOB",
        DataType::Date32 | DataType::Date64 => "DATE",
        DataType::Time32(_) | DataType::Time64(_) => "TIME",
        DataType::Timestamp(_, _) => "TIMESTAMP",
        DataType::Interval(_) => "INTERVAL",
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => "DECIMAL",
        DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => "VARCHAR",
        DataType::Struct(_) => "VARCHAR",
        _ => "VARCHAR",
    }
}

/// Map a JSON parameter value onto DuckDB's own value representation for binding.
fn json_to_duck_value(value: &Value) -> duckdb::types::Value {
    match value {
        Value::Null => duckdb::types::Value::Null,
        Value::Bool(b) => duckdb::types::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                duckdb::types::Value::BigInt(i)
            } else {
                duckdb::types::Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => duckdb::types::Value::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => duckdb::types::Value::Text(value.to_string()),
    }
}

#[async_trait]
impl BackendConnection for DuckDbConnection {
    fn dialect(&self) -> &(dyn crate::dialect::Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let table = table.to_string();
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(TableSchema, duckdb::Connection)> {
            let start = Instant::now();
            let conn = conn;

            let pragma_sql = format!("PRAGMA table_info('{table}')");
            let mut stmt = conn.prepare(&pragma_sql)?;
            let mut rows = stmt.query([])?;
            let mut columns = Vec::new();
            let mut primary_keys = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get("name")?;
                let data_type: String = row.get("type")?;
                let not_null: bool = row.get("notnull")?;
                let pk_flag: bool = row.get("pk")?;
                if pk_flag {
                    primary_keys.push(name.clone());
                }
                columns.push(crate::schema_cache::ColumnSchema { name, data_type, nullable: !not_null });
            }

            let mut foreign_keys = Vec::new();
            let fk_sql = format!("PRAGMA foreign_key_list('{table}')");
            if let Ok(mut fk_stmt) = conn.prepare(&fk_sql) {
                let mut fk_rows = fk_stmt.query([])?;
                while let Some(row) = fk_rows.next()? {
                    let from_column: String = row.get("from")?;
                    let to_table: String = row.get("table")?;
                    let to_column: String = row.get("to")?;
                    foreign_keys.push(ForeignKey { from_column, to_table, to_column });
                }
            }

            tracing::debug!(table = table.as_str(), ms = start.elapsed().as_millis(), "duckdb fetch_schema");
            Ok((TableSchema { columns, primary_keys, foreign_keys }, conn))
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?;

        let (schema, conn) = result?;
        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        Ok(schema)
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let sql = sql.to_string();
        let bound: Vec<duckdb::types::Value> = params.iter().map(json_to_duck_value).collect();
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(QueryResult, duckdb::Connection)> {
            let start = Instant::now();
            let conn = conn;
            let mut stmt = conn.prepare(&sql)?;
            let mut rows_iter = stmt.query(duckdb::params_from_iter(bound.iter()))?;
            let stmt_ref = rows_iter.as_ref().ok_or(CoreError::EmptyResultMalformed)?;
            let mut column_names = Vec::new();
            for idx in 0..stmt_ref.column_count() {
                let name = stmt_ref.column_name(idx).map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
                column_names.push(name.to_string());
            }
            let mut rows = Vec::new();
            while let Some(row) = rows_iter.next()? {
                let mut map = serde_json::Map::new();
                for (idx, name) in column_names.iter().enumerate() {
                    let value = crate::executor::duck_value_to_json(row.get_ref(idx)?.to_owned());
                    map.insert(name.clone(), value);
                }
                rows.push(map);
            }

            let columns: Vec<_> = column_names.into_iter().map(|name| ColumnMeta { name }).collect();
            tracing::debug!(rows = rows.len(), columns = columns.len(), ms = start.elapsed().as_millis(), "duckdb execute_sql");
            Ok((QueryResult { columns, rows }, conn))
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?;

        let (result, conn) = result?;
        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        Ok(result)
    }

    async fn explain_sql(&self, sql: &str, params: &[Value], mode: ExplainMode) -> Result<ExplainResult> {
        let verb = self.dialect.explain_command(mode);
        let explain_sql = format!("{verb} {sql}");
        let bound: Vec<duckdb::types::Value> = params.iter().map(json_to_duck_value).collect();
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(String, duckdb::Connection)> {
            let conn = conn;
            let mut stmt = conn.prepare(&explain_sql)?;
            let mut rows_iter = stmt.query(duckdb::params_from_iter(bound.iter()))?;
            let mut text = String::new();
            while let Some(row) = rows_iter.next()? {
                for idx in 0.. {
                    match row.get_ref(idx) {
                        Ok(value_ref) => {
                            if let Value::String(s) = crate::executor::duck_value_to_json(value_ref.to_owned()) {
                                text.push_str(&s);
                                text.push('\n');
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
            Ok((text, conn))
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?;

        let (text, conn) = result?;
        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        Ok(parse_duckdb_explain(&text))
    }

    async fn fetch_indexes(&self, tables: &[String]) -> Result<Vec<IndexInfo>> {
        let tables = tables.to_vec();
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(Vec<IndexInfo>, duckdb::Connection)> {
            let conn = conn;
            let mut stmt = conn.prepare("SELECT table_name, index_name, is_unique, sql FROM duckdb_indexes()")?;
            let mut rows = stmt.query([])?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let table: String = row.get("table_name")?;
                if !tables.iter().any(|t| t == &table) {
                    continue;
                }
                let name: String = row.get("index_name")?;
                let unique: bool = row.get("is_unique")?;
                let sql: String = row.get::<_, Option<String>>("sql")?.unwrap_or_default();
                let columns = sql
                    .split('(')
                    .nth(1)
                    .and_then(|s| s.split(')').next())
                    .map(|s| s.split(',').map(|c| c.trim().to_string()).collect())
                    .unwrap_or_default();
                result.push(IndexInfo { table, name, unique, columns });
            }
            Ok((result, conn))
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?;

        let (indexes, conn) = result?;
        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        Ok(indexes)
    }
}
