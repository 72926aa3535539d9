//! Runs a compiled plan against a backend connection: binds parameters,
//! coerces numeric columns, and honours cancellation/timeout.
//!
//! Grounded on the teacher's `runtime::run_query` (instrumented entry point,
//! elapsed-time logging) and `executor::duck_value_to_json` (kept below for
//! the DuckDB backend to reuse), narrowed to the four operations spec.md
//! §4.9 names: `execute`, `dryRun`, `explain`, `tableIndexes`.

use std::future::pending;
use std::time::{Duration, Instant};

#[cfg(feature = "duckdb")]
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::backends::BackendConnection;
use crate::dialect::ExplainMode;
use crate::error::{CoreError, Result};
use crate::explain::{ExplainResult, IndexInfo};
use crate::query_builder::{PlannedQuery, QueryWarning};

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
}

/// Raw rows and column metadata as returned by a backend, before numeric
/// coercion is applied.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

/// `execute`'s output: rows with measure columns coerced to JSON numbers,
/// plus any non-fatal warnings the planner attached.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
    pub warnings: Vec<QueryWarning>,
}

/// `dryRun`'s output: the planner's SQL and bound parameters, unexecuted.
#[derive(Debug, Clone)]
pub struct DryRunResult {
    pub sql: String,
    pub params: Vec<Value>,
    pub warnings: Vec<QueryWarning>,
}

/// Per-query cancellation and wall-clock bound, passed down from the
/// embedder's query context. Observed between planning and execution and
/// during the execute call itself.
#[derive(Clone)]
pub struct ExecutionContext {
    pub cancellation: CancellationToken,
    pub timeout: Option<Duration>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self { cancellation: CancellationToken::new(), timeout: None }
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => pending::<()>().await,
    }
}

#[tracing::instrument(skip(conn, params, planned, ctx), fields(sql_len = sql.len(), param_count = params.len()))]
pub async fn execute(
    conn: &dyn BackendConnection,
    sql: &str,
    params: &[Value],
    planned: &PlannedQuery,
    ctx: &ExecutionContext,
) -> Result<ResultSet> {
    if ctx.cancellation.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let start = Instant::now();
    let raw = tokio::select! {
        res = conn.execute_sql(sql, params) => res,
        _ = ctx.cancellation.cancelled() => return Err(CoreError::Cancelled),
        _ = sleep_or_pending(ctx.timeout) => return Err(CoreError::Timeout),
    };

    let raw = raw.map_err(|e| CoreError::DriverError {
        message: e.to_string(),
        sql: sql.to_string(),
        param_count: params.len(),
    })?;

    let dialect = conn.dialect();
    let mut rows = raw.rows;
    for row in rows.iter_mut() {
        for field in &planned.numeric_fields {
            if let Some(v) = row.remove(field) {
                row.insert(field.clone(), dialect.coerce_measure(v));
            }
        }
    }

    tracing::info!(rows = rows.len(), ms = start.elapsed().as_millis(), "query executed");
    Ok(ResultSet { columns: raw.columns, rows, warnings: planned.warnings.clone() })
}

/// The planner's output without execution — never touches the driver.
pub fn dry_run(sql: String, params: Vec<Value>, warnings: Vec<QueryWarning>) -> DryRunResult {
    DryRunResult { sql, params, warnings }
}

#[tracing::instrument(skip(conn, params), fields(sql_len = sql.len(), analyze))]
pub async fn explain(conn: &dyn BackendConnection, sql: &str, params: &[Value], analyze: bool) -> Result<ExplainResult> {
    let mode = if analyze { ExplainMode::Analyze } else { ExplainMode::Plain };
    conn.explain_sql(sql, params, mode).await.map_err(|e| CoreError::DriverError {
        message: e.to_string(),
        sql: sql.to_string(),
        param_count: params.len(),
    })
}

#[tracing::instrument(skip(conn))]
pub async fn table_indexes(conn: &dyn BackendConnection, tables: &[String]) -> Result<Vec<IndexInfo>> {
    conn.fetch_indexes(tables).await
}

#[cfg(feature = "duckdb")]
pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => Value::String(i.to_string()),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Timestamp(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(d) => Value::from(d),
        DuckValue::Time64(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Interval { months, days, nanos } => Value::String(format!("{months} months {days} days {nanos} nanos")),
        DuckValue::List(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Enum(s) => Value::String(s),
        DuckValue::Struct(fields) => {
            let mut map = Map::new();
            for (key, val) in fields.iter() {
                map.insert(key.clone(), duck_value_to_json(val.clone()));
            }
            Value::Object(map)
        }
        DuckValue::Array(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Map(entries) => {
            let pairs: Vec<Value> = entries
                .iter()
                .map(|(k, v)| Value::Array(vec![duck_value_to_json(k.clone()), duck_value_to_json(v.clone())]))
                .collect();
            Value::Array(pairs)
        }
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}
