//! SQL dialect abstractions for the four supported backends.
//!
//! Each dialect is implemented in its own file and gated behind a feature
//! flag, exactly as the teacher lays out `dialect/{postgres,duckdb}.rs`. The
//! trait only maps logical constructs (functions, aggregations, literals,
//! capability flags) to SQL fragments; expression-tree walking lives in
//! `sql_ast::SqlRenderer`.

use serde_json::Value;

use crate::expr::{CastType, SqlFunction};
use crate::model::{SimpleAgg, WindowKind, WindowOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainMode {
    Plain,
    Analyze,
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, ident: &str) -> String;

    fn qualify_table(&self, table: &str) -> String {
        self.quote_ident(table)
    }

    /// Parameter placeholder for the Nth (0-based) bound value.
    fn placeholder(&self, idx: usize) -> String {
        let _ = idx;
        "?".to_string()
    }

    fn supports_filtered_aggregates(&self) -> bool {
        false
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn supports_window_functions(&self) -> bool {
        true
    }

    fn supports_flow_queries(&self) -> bool {
        self.supports_window_functions()
    }

    fn render_function(&self, func: &SqlFunction, args: Vec<String>) -> String;

    fn render_aggregation(&self, agg: &SimpleAgg, expr: &str) -> String {
        match agg {
            SimpleAgg::Count => format!("COUNT({expr})"),
            SimpleAgg::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::CountDistinctApprox => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::Sum => format!("SUM({expr})"),
            SimpleAgg::Avg => format!("AVG({expr})"),
            SimpleAgg::Min => format!("MIN({expr})"),
            SimpleAgg::Max => format!("MAX({expr})"),
            SimpleAgg::Stddev => format!("STDDEV_POP({expr})"),
            SimpleAgg::Median => format!("MEDIAN({expr})"),
            SimpleAgg::P95 => format!("PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY {expr})"),
        }
    }

    fn render_window(&self, kind: &WindowKind, op: &WindowOp, source_expr: &str, order_by: &str, frame: &str) -> String {
        let base = match kind {
            WindowKind::Lag => format!("LAG({source_expr}) OVER ({order_by})"),
            WindowKind::Rank => format!("RANK() OVER ({order_by})"),
            WindowKind::MovingSum => format!("SUM({source_expr}) OVER ({order_by} {frame})"),
            WindowKind::MovingAvg => format!("AVG({source_expr}) OVER ({order_by} {frame})"),
            WindowKind::RunningTotal => format!("SUM({source_expr}) OVER ({order_by} {frame})"),
        };
        match op {
            WindowOp::Raw => base,
            WindowOp::Difference => format!("({source_expr} - {base})"),
            WindowOp::PercentChange => format!("(({source_expr} - {base}) / NULLIF({base}, 0) * 100)"),
        }
    }

    /// Literal rendering used ONLY for values the renderer has decided are
    /// safe to inline directly (there are none in query bodies — every
    /// user-supplied or security-context value is bound via `placeholder`).
    /// Exists for completeness of the capability surface (e.g. EXPLAIN
    /// fallback when the driver can't accept bound parameters).
    fn render_inline_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_inline_literal(v)).collect();
                rendered.join(", ")
            }
            Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
        }
    }

    fn explain_command(&self, mode: ExplainMode) -> &'static str;

    /// Convert a driver-returned value into a JSON number when the column is
    /// declared a measure; leave everything else untouched. Accepts numeric
    /// strings (including scientific notation) and preserves null.
    fn coerce_measure(&self, value: Value) -> Value {
        match value {
            Value::String(s) => {
                if let Ok(n) = s.parse::<f64>() {
                    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::String(s))
                } else {
                    Value::String(s)
                }
            }
            other => other,
        }
    }
}

pub(crate) fn render_cast(data_type: &CastType) -> &'static str {
    match data_type {
        CastType::Integer => "INTEGER",
        CastType::Numeric => "NUMERIC",
        CastType::Text => "TEXT",
        CastType::Boolean => "BOOLEAN",
        CastType::Timestamp => "TIMESTAMP",
    }
}

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDialect;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "mysql")]
pub use mysql::MySqlDialect;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDialect;

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbDialect;
