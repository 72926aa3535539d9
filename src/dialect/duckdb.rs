//! DuckDB dialect implementation.

use crate::expr::SqlFunction;
use crate::model::SimpleAgg;

use super::{render_cast, Dialect, ExplainMode};

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn supports_filtered_aggregates(&self) -> bool {
        true
    }

    fn supports_lateral(&self) -> bool {
        true
    }

    fn render_aggregation(&self, agg: &SimpleAgg, expr: &str) -> String {
        match agg {
            SimpleAgg::P95 => format!("QUANTILE_CONT({expr}, 0.95)"),
            SimpleAgg::CountDistinctApprox => format!("APPROX_COUNT_DISTINCT({expr})"),
            _ => {
                match agg {
                    SimpleAgg::Count => format!("COUNT({expr})"),
                    SimpleAgg::CountDistinct => format!("COUNT(DISTINCT {expr})"),
                    SimpleAgg::Sum => format!("SUM({expr})"),
                    SimpleAgg::Avg => format!("AVG({expr})"),
                    SimpleAgg::Min => format!("MIN({expr})"),
                    SimpleAgg::Max => format!("MAX({expr})"),
                    SimpleAgg::Stddev => format!("STDDEV_POP({expr})"),
                    SimpleAgg::Median => format!("MEDIAN({expr})"),
                    SimpleAgg::P95 | SimpleAgg::CountDistinctApprox => unreachable!(),
                }
            }
        }
    }

    fn render_function(&self, func: &SqlFunction, args: Vec<String>) -> String {
        match func {
            SqlFunction::DateTruncDay => format!("date_trunc('day', {})", args.join(", ")),
            SqlFunction::DateTruncWeek => format!("date_trunc('week', {})", args.join(", ")),
            SqlFunction::DateTruncMonth => format!("date_trunc('month', {})", args.join(", ")),
            SqlFunction::DateTruncQuarter => format!("date_trunc('quarter', {})", args.join(", ")),
            SqlFunction::DateTruncYear => format!("date_trunc('year', {})", args.join(", ")),
            SqlFunction::Lower => format!("lower({})", args.join(", ")),
            SqlFunction::Upper => format!("upper({})", args.join(", ")),
            SqlFunction::Concat => format!("concat({})", args.join(", ")),
            SqlFunction::Substring => match args.as_slice() {
                [expr, start, len] => format!("substring({expr}, {start}, {len})"),
                [expr, start] => format!("substring({expr}, {start})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Length => format!("length({})", args.join(", ")),
            SqlFunction::Trim => format!("trim({})", args.join(", ")),
            SqlFunction::Coalesce => format!("coalesce({})", args.join(", ")),
            SqlFunction::NullIf => match args.as_slice() {
                [a, b] => format!("nullif({a}, {b})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Greatest => format!("greatest({})", args.join(", ")),
            SqlFunction::Least => format!("least({})", args.join(", ")),
            SqlFunction::SafeDivide => match args.as_slice() {
                [left, right] => format!("{left} / NULLIF({right}, 0)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Abs => format!("abs({})", args.join(", ")),
            SqlFunction::Ceil => format!("ceil({})", args.join(", ")),
            SqlFunction::Floor => format!("floor({})", args.join(", ")),
            SqlFunction::Round => match args.as_slice() {
                [expr, decimals] => format!("round({expr}, {decimals})"),
                [expr] => format!("round({expr})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Cast(data_type) => match args.as_slice() {
                [expr] => format!("TRY_CAST({expr} AS {})", render_cast(data_type)),
                _ => "NULL".to_string(),
            },
        }
    }

    fn explain_command(&self, mode: ExplainMode) -> &'static str {
        match mode {
            ExplainMode::Plain => "EXPLAIN",
            ExplainMode::Analyze => "EXPLAIN ANALYZE",
        }
    }
}
