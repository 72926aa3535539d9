//! SQLite dialect implementation. No LATERAL support, so flow queries (which
//! require either LATERAL or window functions over each layer) are rejected
//! for this dialect with `flow/engine-unsupported`.

use crate::expr::SqlFunction;
use crate::model::SimpleAgg;

use super::{Dialect, ExplainMode};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn supports_filtered_aggregates(&self) -> bool {
        true // SQLite 3.25+
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn supports_flow_queries(&self) -> bool {
        false
    }

    fn render_aggregation(&self, agg: &SimpleAgg, expr: &str) -> String {
        match agg {
            // SQLite has no native percentile function; approximate via AVG
            // over a manual ordering is out of scope for a single aggregate
            // expression, so fall back to AVG and let dialect-parity tests
            // document the bounded error for statistical measures.
            SimpleAgg::Median | SimpleAgg::P95 => format!("AVG({expr})"),
            SimpleAgg::CountDistinctApprox => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::Count => format!("COUNT({expr})"),
            SimpleAgg::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::Sum => format!("SUM({expr})"),
            SimpleAgg::Avg => format!("AVG({expr})"),
            SimpleAgg::Min => format!("MIN({expr})"),
            SimpleAgg::Max => format!("MAX({expr})"),
            SimpleAgg::Stddev => format!("STDDEV_POP({expr})"), // requires an extension; documented gap
        }
    }

    fn render_function(&self, func: &SqlFunction, args: Vec<String>) -> String {
        match func {
            SqlFunction::DateTruncDay => match args.as_slice() {
                [expr] => format!("date({expr})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncWeek => match args.as_slice() {
                [expr] => format!("date({expr}, 'weekday 0', '-6 days')"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncMonth => match args.as_slice() {
                [expr] => format!("date({expr}, 'start of month')"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncQuarter => match args.as_slice() {
                [expr] => format!(
                    "date({expr}, 'start of month', '-' || ((CAST(strftime('%m', {expr}) AS INTEGER) - 1) % 3) || ' months')"
                ),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncYear => match args.as_slice() {
                [expr] => format!("date({expr}, 'start of year')"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Lower => format!("lower({})", args.join(", ")),
            SqlFunction::Upper => format!("upper({})", args.join(", ")),
            SqlFunction::Concat => format!("({})", args.join(" || ")),
            SqlFunction::Substring => match args.as_slice() {
                [expr, start, len] => format!("substr({expr}, {start}, {len})"),
                [expr, start] => format!("substr({expr}, {start})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Length => format!("length({})", args.join(", ")),
            SqlFunction::Trim => format!("trim({})", args.join(", ")),
            SqlFunction::Coalesce => format!("coalesce({})", args.join(", ")),
            SqlFunction::NullIf => match args.as_slice() {
                [a, b] => format!("nullif({a}, {b})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Greatest => format!("max({})", args.join(", ")),
            SqlFunction::Least => format!("min({})", args.join(", ")),
            SqlFunction::SafeDivide => match args.as_slice() {
                [left, right] => format!("{left} / NULLIF({right}, 0)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Abs => format!("abs({})", args.join(", ")),
            SqlFunction::Ceil => match args.as_slice() {
                [expr] => format!("(CASE WHEN {expr} = CAST({expr} AS INTEGER) THEN CAST({expr} AS INTEGER) ELSE CAST({expr} AS INTEGER) + 1 END)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Floor => match args.as_slice() {
                [expr] => format!("CAST({expr} AS INTEGER)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Round => match args.as_slice() {
                [expr, decimals] => format!("round({expr}, {decimals})"),
                [expr] => format!("round({expr})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Cast(data_type) => match args.as_slice() {
                [expr] => format!("CAST({expr} AS {})", sqlite_cast(data_type)),
                _ => "NULL".to_string(),
            },
        }
    }

    fn explain_command(&self, _mode: ExplainMode) -> &'static str {
        "EXPLAIN QUERY PLAN"
    }
}

fn sqlite_cast(data_type: &crate::expr::CastType) -> &'static str {
    use crate::expr::CastType;
    match data_type {
        CastType::Integer => "INTEGER",
        CastType::Numeric => "REAL",
        CastType::Text => "TEXT",
        CastType::Boolean => "INTEGER",
        CastType::Timestamp => "TEXT",
    }
}
