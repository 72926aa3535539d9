//! MySQL / SingleStore backend implementation (wire-compatible, `mysql_async` driver).

use std::time::Instant;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Params, Row, Value as MyValue};
use serde_json::{Map, Value};

use crate::dialect::{Dialect, ExplainMode, MySqlDialect};
use crate::error::{CoreError, Result};
use crate::executor::{ColumnMeta, QueryResult};
use crate::explain::{parse_mysql_explain, ExplainResult, IndexInfo};
use crate::schema_cache::{ForeignKey, TableSchema};

use super::BackendConnection;

pub struct MySqlConnection {
    pool: mysql_async::Pool,
    schema: String,
    dialect: MySqlDialect,
}

impl MySqlConnection {
    /// Create a new connection pool from a `mysql://` URL. `dialect` should be
    /// `MySqlDialect::singlestore()`/`mysql8()`/`mysql57()` depending on which
    /// engine is behind the wire protocol.
    pub fn new(connection_string: &str, schema: &str, dialect: MySqlDialect) -> Result<Self> {
        tracing::info!(schema = %schema, "creating MySQL connection pool");
        let pool = mysql_async::Pool::new(connection_string);
        Ok(Self { pool, schema: schema.to_string(), dialect })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn driver_err(sql: &str, param_count: usize, e: impl std::fmt::Display) -> CoreError {
        CoreError::DriverError { message: e.to_string(), sql: sql.to_string(), param_count }
    }
}

fn json_to_mysql_value(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MyValue::Int(i)
            } else {
                MyValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => MyValue::Bytes(s.clone().into_bytes()),
        Value::Array(_) | Value::Object(_) => MyValue::Bytes(value.to_string().into_bytes()),
    }
}

fn mysql_value_to_json(value: &MyValue) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(s) => Value::String(s),
            Err(_) => Value::String(hex::encode(bytes)),
        },
        MyValue::Int(i) => Value::from(*i),
        MyValue::UInt(u) => Value::from(*u),
        MyValue::Float(f) => serde_json::Number::from_f64(*f as f64).map(Value::Number).unwrap_or(Value::Null),
        MyValue::Double(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        MyValue::Date(y, mo, d, h, mi, s, micro) => {
            Value::String(format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{micro:06}"))
        }
        MyValue::Time(neg, d, h, mi, s, micro) => {
            let sign = if *neg { "-" } else { "" };
            Value::String(format!("{sign}{d}d{h:02}:{mi:02}:{s:02}.{micro:06}"))
        }
    }
}

#[async_trait]
impl BackendConnection for MySqlConnection {
    fn dialect(&self) -> &(dyn crate::dialect::Dialect + Send + Sync) {
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let start = Instant::now();
        let mut conn = self.pool.get_conn().await.map_err(|e| Self::driver_err("(connect)", 0, e))?;

        let columns_sql = r#"
            SELECT column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = :schema AND table_name = :table
            ORDER BY ordinal_position
        "#;
        let column_rows: Vec<Row> = conn
            .exec(columns_sql, mysql_async::params! { "schema" => &self.schema, "table" => table })
            .await
            .map_err(|e| Self::driver_err(columns_sql, 2, e))?;

        let mut columns = Vec::new();
        for row in &column_rows {
            let name: String = row.get("column_name").unwrap_or_default();
            let data_type: String = row.get("data_type").unwrap_or_default();
            let is_nullable: String = row.get("is_nullable").unwrap_or_default();
            columns.push(crate::schema_cache::ColumnSchema { name, data_type, nullable: is_nullable == "YES" });
        }

        let pk_sql = r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = :schema AND tc.table_name = :table AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
        "#;
        let pk_rows: Vec<Row> = conn
            .exec(pk_sql, mysql_async::params! { "schema" => &self.schema, "table" => table })
            .await
            .map_err(|e| Self::driver_err(pk_sql, 2, e))?;
        let primary_keys: Vec<String> = pk_rows.iter().map(|row| row.get("column_name").unwrap_or_default()).collect();

        let fk_sql = r#"
            SELECT column_name, referenced_table_name, referenced_column_name
            FROM information_schema.key_column_usage
            WHERE table_schema = :schema AND table_name = :table AND referenced_table_name IS NOT NULL
        "#;
        let fk_rows: Vec<Row> = conn
            .exec(fk_sql, mysql_async::params! { "schema" => &self.schema, "table" => table })
            .await
            .map_err(|e| Self::driver_err(fk_sql, 2, e))?;
        let foreign_keys: Vec<ForeignKey> = fk_rows
            .iter()
            .map(|row| ForeignKey {
                from_column: row.get("column_name").unwrap_or_default(),
                to_table: row.get("referenced_table_name").unwrap_or_default(),
                to_column: row.get("referenced_column_name").unwrap_or_default(),
            })
            .collect();

        tracing::debug!(table, schema = self.schema.as_str(), ms = start.elapsed().as_millis(), "mysql fetch_schema");
        Ok(TableSchema { columns, primary_keys, foreign_keys })
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        let mut conn = self.pool.get_conn().await.map_err(|e| Self::driver_err(sql, params.len(), e))?;
        let bound: Vec<MyValue> = params.iter().map(json_to_mysql_value).collect();

        let rows: Vec<Row> = conn
            .exec(sql, Params::Positional(bound))
            .await
            .map_err(|e| Self::driver_err(sql, params.len(), e))?;

        let mut columns: Vec<ColumnMeta> = Vec::new();
        if let Some(first_row) = rows.first() {
            columns = first_row.columns_ref().iter().map(|c| ColumnMeta { name: c.name_str().to_string() }).collect();
        }
        let mut result_rows = Vec::new();
        for row in &rows {
            let mut map = Map::new();
            for (idx, col) in row.columns_ref().iter().enumerate() {
                let value = row.as_ref(idx).map(mysql_value_to_json).unwrap_or(Value::Null);
                map.insert(col.name_str().to_string(), value);
            }
            result_rows.push(map);
        }

        tracing::debug!(rows = result_rows.len(), ms = start.elapsed().as_millis(), "mysql execute_sql");
        Ok(QueryResult { columns, rows: result_rows })
    }

    async fn explain_sql(&self, sql: &str, params: &[Value], _mode: ExplainMode) -> Result<ExplainResult> {
        let mut conn = self.pool.get_conn().await.map_err(|e| Self::driver_err(sql, params.len(), e))?;
        let bound: Vec<MyValue> = params.iter().map(json_to_mysql_value).collect();
        let explain_sql = format!("EXPLAIN {sql}");
        let rows: Vec<Row> = conn
            .exec(&explain_sql, Params::Positional(bound))
            .await
            .map_err(|e| Self::driver_err(sql, params.len(), e))?;

        let mapped: Vec<Map<String, Value>> = rows
            .iter()
            .map(|row| {
                let mut map = Map::new();
                for (idx, col) in row.columns_ref().iter().enumerate() {
                    let value = row.as_ref(idx).map(mysql_value_to_json).unwrap_or(Value::Null);
                    map.insert(col.name_str().to_string(), value);
                }
                map
            })
            .collect();

        Ok(parse_mysql_explain(mapped))
    }

    async fn fetch_indexes(&self, tables: &[String]) -> Result<Vec<IndexInfo>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| Self::driver_err("(connect)", 0, e))?;
        let mut result = Vec::new();
        for table in tables {
            let sql = format!("SHOW INDEX FROM {}", self.dialect.quote_ident(table));
            let rows: Vec<Row> = match conn.query(&sql).await {
                Ok(rows) => rows,
                Err(_) => continue,
            };
            let mut by_index: std::collections::HashMap<String, (bool, Vec<String>)> = std::collections::HashMap::new();
            for row in &rows {
                let key_name: String = row.get("Key_name").unwrap_or_default();
                let non_unique: i64 = row.get("Non_unique").unwrap_or(1);
                let column_name: String = row.get("Column_name").unwrap_or_default();
                let entry = by_index.entry(key_name).or_insert((non_unique == 0, Vec::new()));
                entry.1.push(column_name);
            }
            for (name, (unique, columns)) in by_index {
                result.push(IndexInfo { table: table.clone(), name, unique, columns });
            }
        }
        Ok(result)
    }
}
