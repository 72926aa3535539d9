//! Builds the SELECT item for a simple (aggregate) measure, including its
//! row-level FILTER/CASE-WHEN predicate.
//!
//! Grounded on the teacher's `query_builder::builders::build_measure_selects`,
//! narrowed to the `Simple` measure shape — calculated and window measures are
//! assembled one stage out, in `plan.rs`, since they need sibling columns.

use crate::error::CoreError;
use crate::filter_builder::build_filters;
use crate::model::{Cube, Measure, MeasureKind};
use crate::query::SecurityContext;
use crate::query_builder::resolve::sqlref_to_sqlexpr;
use crate::sql_ast::{SelectItem, SqlExpr};

/// The projected column alias for a `cube.field` reference: dots aren't valid
/// unquoted identifiers across all four dialects, so the planner uses a
/// double-underscore join for every projected alias.
pub fn projected_alias(cube_name: &str, field_name: &str) -> String {
    format!("{cube_name}__{field_name}")
}

/// Build the SELECT item for a `Simple` measure. Row-level filters declared
/// on the measure are threaded through as the aggregate's FILTER predicate;
/// the renderer decides FILTER-clause vs. CASE WHEN based on dialect support.
pub fn build_simple_measure_select<F>(
    cube: &Cube,
    measure: &Measure,
    resolve_filter_field: &F,
    security: &SecurityContext,
) -> Result<SelectItem, CoreError>
where
    F: Fn(&str) -> Result<SqlExpr, CoreError>,
{
    let MeasureKind::Simple { sql, agg } = &measure.kind else {
        return Err(CoreError::Other(anyhow::anyhow!("'{}' is not a simple measure", measure.name)));
    };
    let inner = sqlref_to_sqlexpr(sql, &cube.name, security)?;
    let filter = build_filters(&measure.filters, resolve_filter_field)?;

    Ok(SelectItem {
        expr: SqlExpr::Aggregate { agg: *agg, expr: Box::new(inner), filter: filter.map(Box::new) },
        alias: Some(projected_alias(&cube.name, &measure.name)),
    })
}
