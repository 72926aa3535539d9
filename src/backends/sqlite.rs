//! SQLite backend implementation (`rusqlite`, bundled).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::dialect::{ExplainMode, SqliteDialect};
use crate::error::{CoreError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::explain::{parse_sqlite_query_plan, ExplainResult, IndexInfo};
use crate::schema_cache::{ForeignKey, TableSchema};

use super::BackendConnection;

/// `rusqlite::Connection` is `!Sync`, so access is serialized behind a tokio
/// mutex and every call runs inside `spawn_blocking`.
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    dialect: SqliteDialect,
}

impl SqliteConnection {
    pub fn new(path: &str) -> Result<Self> {
        tracing::info!(path, "opening SQLite connection");
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| CoreError::Config(format!("open sqlite database: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), dialect: SqliteDialect })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| CoreError::Config(format!("open in-memory sqlite database: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), dialect: SqliteDialect })
    }
}

fn json_to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqliteValue::Integer(i)
            } else {
                SqliteValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqliteValue::Text(value.to_string()),
    }
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[async_trait]
impl BackendConnection for SqliteConnection {
    fn dialect(&self) -> &(dyn crate::dialect::Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let table = table.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<TableSchema> {
            let start = Instant::now();
            let guard = conn.blocking_lock();

            let pragma_sql = format!("PRAGMA table_info('{table}')");
            let mut stmt = guard.prepare(&pragma_sql)?;
            let mut rows = stmt.query([])?;
            let mut columns = Vec::new();
            let mut primary_keys = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get("name")?;
                let data_type: String = row.get("type")?;
                let not_null: bool = row.get("notnull")?;
                let pk_flag: i64 = row.get("pk")?;
                if pk_flag > 0 {
                    primary_keys.push(name.clone());
                }
                columns.push(crate::schema_cache::ColumnSchema { name, data_type, nullable: !not_null });
            }

            let mut foreign_keys = Vec::new();
            let fk_sql = format!("PRAGMA foreign_key_list('{table}')");
            if let Ok(mut fk_stmt) = guard.prepare(&fk_sql) {
                let mut fk_rows = fk_stmt.query([])?;
                while let Some(row) = fk_rows.next()? {
                    let from_column: String = row.get("from")?;
                    let to_table: String = row.get("table")?;
                    let to_column: String = row.get("to")?;
                    foreign_keys.push(ForeignKey { from_column, to_table, to_column });
                }
            }

            tracing::debug!(table = table.as_str(), ms = start.elapsed().as_millis(), "sqlite fetch_schema");
            Ok(TableSchema { columns, primary_keys, foreign_keys })
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let sql = sql.to_string();
        let bound: Vec<SqliteValue> = params.iter().map(json_to_sqlite_value).collect();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<QueryResult> {
            let start = Instant::now();
            let guard = conn.blocking_lock();
            let mut stmt = guard.prepare(&sql)?;
            let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            let mut rows_iter = stmt.query(params_ref.as_slice())?;
            let mut rows = Vec::new();
            while let Some(row) = rows_iter.next()? {
                let mut map = Map::new();
                for (idx, name) in column_names.iter().enumerate() {
                    map.insert(name.clone(), sqlite_value_to_json(row.get_ref(idx)?));
                }
                rows.push(map);
            }
            let columns: Vec<_> = column_names.into_iter().map(|name| ColumnMeta { name }).collect();
            tracing::debug!(rows = rows.len(), columns = columns.len(), ms = start.elapsed().as_millis(), "sqlite execute_sql");
            Ok(QueryResult { columns, rows })
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?
    }

    async fn explain_sql(&self, sql: &str, params: &[Value], _mode: ExplainMode) -> Result<ExplainResult> {
        let explain_sql = format!("EXPLAIN QUERY PLAN {sql}");
        let bound: Vec<SqliteValue> = params.iter().map(json_to_sqlite_value).collect();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<ExplainResult> {
            let guard = conn.blocking_lock();
            let mut stmt = guard.prepare(&explain_sql)?;
            let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            let mut rows_iter = stmt.query(params_ref.as_slice())?;
            let mut mapped = Vec::new();
            while let Some(row) = rows_iter.next()? {
                let mut map = Map::new();
                map.insert("id".to_string(), Value::from(row.get::<_, i64>("id")?));
                map.insert("parent".to_string(), Value::from(row.get::<_, i64>("parent")?));
                map.insert("detail".to_string(), Value::String(row.get::<_, String>("detail")?));
                mapped.push(map);
            }
            Ok(parse_sqlite_query_plan(mapped))
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?
    }

    async fn fetch_indexes(&self, tables: &[String]) -> Result<Vec<IndexInfo>> {
        let tables = tables.to_vec();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<IndexInfo>> {
            let guard = conn.blocking_lock();
            let mut result = Vec::new();
            for table in &tables {
                let list_sql = format!("PRAGMA index_list('{table}')");
                let mut list_stmt = match guard.prepare(&list_sql) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let mut list_rows = list_stmt.query([])?;
                while let Some(row) = list_rows.next()? {
                    let name: String = row.get("name")?;
                    let unique: bool = row.get::<_, i64>("unique")? != 0;

                    let info_sql = format!("PRAGMA index_info('{name}')");
                    let mut info_stmt = guard.prepare(&info_sql)?;
                    let mut info_rows = info_stmt.query([])?;
                    let mut columns = Vec::new();
                    while let Some(info_row) = info_rows.next()? {
                        columns.push(info_row.get::<_, String>("name")?);
                    }
                    result.push(IndexInfo { table: table.clone(), name, unique, columns });
                }
            }
            Ok(result)
        })
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!("task join error: {e}")))?
    }
}
