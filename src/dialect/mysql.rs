//! MySQL dialect implementation. SingleStore is MySQL-wire-compatible, so it
//! reuses this dialect; the only divergence (native LATERAL/window support on
//! SingleStore vs. MySQL 8+) is a capability-flag override on construction.

use crate::expr::SqlFunction;
use crate::model::SimpleAgg;

use super::{Dialect, ExplainMode};

#[derive(Debug, Clone, Copy)]
pub struct MySqlDialect {
    /// SingleStore and MySQL 8+ both support LATERAL; MySQL 5.7 does not.
    pub lateral_supported: bool,
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self { lateral_supported: true }
    }
}

impl MySqlDialect {
    pub fn singlestore() -> Self {
        Self { lateral_supported: true }
    }

    pub fn mysql8() -> Self {
        Self { lateral_supported: true }
    }

    pub fn mysql57() -> Self {
        Self { lateral_supported: false }
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn supports_filtered_aggregates(&self) -> bool {
        false
    }

    fn supports_lateral(&self) -> bool {
        self.lateral_supported
    }

    fn render_aggregation(&self, agg: &SimpleAgg, expr: &str) -> String {
        match agg {
            SimpleAgg::Median => format!("(SELECT PERCENTILE_CONT({expr}, 0.5))"),
            SimpleAgg::P95 => format!("(SELECT PERCENTILE_CONT({expr}, 0.95))"),
            SimpleAgg::CountDistinctApprox => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::Count => format!("COUNT({expr})"),
            SimpleAgg::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            SimpleAgg::Sum => format!("SUM({expr})"),
            SimpleAgg::Avg => format!("AVG({expr})"),
            SimpleAgg::Min => format!("MIN({expr})"),
            SimpleAgg::Max => format!("MAX({expr})"),
            SimpleAgg::Stddev => format!("STDDEV_POP({expr})"),
        }
    }

    fn render_function(&self, func: &SqlFunction, args: Vec<String>) -> String {
        match func {
            SqlFunction::DateTruncDay => match args.as_slice() {
                [expr] => format!("DATE({expr})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncWeek => match args.as_slice() {
                [expr] => format!("DATE_SUB({expr}, INTERVAL WEEKDAY({expr}) DAY)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncMonth => match args.as_slice() {
                [expr] => format!("DATE_FORMAT({expr}, '%Y-%m-01')"),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncQuarter => match args.as_slice() {
                [expr] => format!(
                    "MAKEDATE(YEAR({expr}), 1) + INTERVAL (QUARTER({expr}) - 1) QUARTER"
                ),
                _ => "NULL".to_string(),
            },
            SqlFunction::DateTruncYear => match args.as_slice() {
                [expr] => format!("DATE_FORMAT({expr}, '%Y-01-01')"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Lower => format!("LOWER({})", args.join(", ")),
            SqlFunction::Upper => format!("UPPER({})", args.join(", ")),
            SqlFunction::Concat => format!("CONCAT({})", args.join(", ")),
            SqlFunction::Substring => match args.as_slice() {
                [expr, start, len] => format!("SUBSTRING({expr}, {start}, {len})"),
                [expr, start] => format!("SUBSTRING({expr}, {start})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Length => format!("LENGTH({})", args.join(", ")),
            SqlFunction::Trim => format!("TRIM({})", args.join(", ")),
            SqlFunction::Coalesce => format!("COALESCE({})", args.join(", ")),
            SqlFunction::NullIf => match args.as_slice() {
                [a, b] => format!("NULLIF({a}, {b})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Greatest => format!("GREATEST({})", args.join(", ")),
            SqlFunction::Least => format!("LEAST({})", args.join(", ")),
            SqlFunction::SafeDivide => match args.as_slice() {
                [left, right] => format!("{left} / NULLIF({right}, 0)"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Abs => format!("ABS({})", args.join(", ")),
            SqlFunction::Ceil => format!("CEIL({})", args.join(", ")),
            SqlFunction::Floor => format!("FLOOR({})", args.join(", ")),
            SqlFunction::Round => match args.as_slice() {
                [expr, decimals] => format!("ROUND({expr}, {decimals})"),
                [expr] => format!("ROUND({expr})"),
                _ => "NULL".to_string(),
            },
            SqlFunction::Cast(data_type) => match args.as_slice() {
                [expr] => format!("CAST({expr} AS {})", mysql_cast(data_type)),
                _ => "NULL".to_string(),
            },
        }
    }

    fn explain_command(&self, _mode: ExplainMode) -> &'static str {
        "EXPLAIN"
    }
}

fn mysql_cast(data_type: &crate::expr::CastType) -> &'static str {
    use crate::expr::CastType;
    match data_type {
        CastType::Integer => "SIGNED",
        CastType::Numeric => "DECIMAL(38,10)",
        CastType::Text => "CHAR",
        CastType::Boolean => "UNSIGNED",
        CastType::Timestamp => "DATETIME",
    }
}
