//! Assembles a `SemanticQuery` into a `SelectQuery`: a `SimplePlan` (one
//! aggregating SELECT) when only simple measures are requested, or a
//! `TwoStagePlan` (inner aggregation, outer SELECT recomputing calculated
//! formulas and window functions over the aggregated rows) otherwise.
//!
//! Grounded on the teacher's `query_builder::planner::build_query` staging
//! (resolve components, then assemble a plan), narrowed from the teacher's
//! full multi-grain CTE re-aggregation engine to the two-stage shape.

use std::collections::BTreeSet;

use serde_json::json;

use crate::datetime::{parse_date_range, DateRangeSpec, Granularity};
use crate::dialect::Dialect;
use crate::error::CoreError;
use crate::expr_parser::{CalcAst, CalcFunction, CalcOp};
use crate::filter_builder::build_filters;
use crate::join_planner::plan_joins;
use crate::model::{FrameBound, MeasureKind, WindowFrame};
use crate::query::{FilterCondition, QueryContext, SecurityContext, SemanticQuery};
use crate::query_builder::measures::{build_simple_measure_select, projected_alias};
use crate::query_builder::resolve::{require_cube, resolve_dimension, resolve_measure, split_field, sqlref_to_sqlexpr};
use crate::registry::CubeRegistry;
use crate::sql_ast::{
    Join as SqlJoin, OrderItem as SqlOrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, TableRef,
};

#[derive(Debug, Clone)]
pub enum QueryWarning {
    FanOut { cube: String },
    HighFlowDepth { depth: i32 },
    AmbiguousJoinPath { cube: String },
}

#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub select_query: SelectQuery,
    /// Output column aliases the executor must coerce to numbers.
    pub numeric_fields: Vec<String>,
    pub warnings: Vec<QueryWarning>,
}

pub struct QueryPlanner<'d> {
    registry: &'d CubeRegistry,
    dialect: &'d dyn Dialect,
}

impl<'d> QueryPlanner<'d> {
    pub fn new(registry: &'d CubeRegistry, dialect: &'d dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    pub fn plan(&self, query: &SemanticQuery, ctx: &QueryContext) -> Result<PlannedQuery, CoreError> {
        if query.offset.is_some() && query.limit.is_none() {
            return Err(CoreError::OffsetWithoutLimit);
        }
        if query.dimensions.is_empty() && query.measures.is_empty() {
            return Err(CoreError::Other(anyhow::anyhow!("query must reference at least one dimension or measure")));
        }

        match query.time_dimensions.iter().position(|td| td.compare_to_prior_period) {
            Some(idx) => self.plan_comparison(query, ctx, idx),
            None => self.build_single(query, ctx),
        }
    }

    /// `compareToPriorPeriod` builds two full plans for the same query — one
    /// with the requested date range, one with `range.prior()` substituted in
    /// its place — and unions them, each branch labelled by a trailing
    /// `__period` column. Only the current-period branch's ORDER BY/LIMIT
    /// apply to the combined result.
    fn plan_comparison(&self, query: &SemanticQuery, ctx: &QueryContext, td_idx: usize) -> Result<PlannedQuery, CoreError> {
        let td = &query.time_dimensions[td_idx];
        let spec = td.date_range.as_ref().ok_or_else(|| {
            CoreError::Other(anyhow::anyhow!(
                "compareToPriorPeriod on '{}' requires an explicit dateRange",
                td.dimension
            ))
        })?;
        let range = parse_date_range(spec, ctx.now)?;
        let prior = range.prior();

        let mut current_query = query.clone();
        current_query.time_dimensions[td_idx].compare_to_prior_period = false;
        current_query.time_dimensions[td_idx].date_range =
            Some(DateRangeSpec::Absolute { start: range.start.to_rfc3339(), end: range.end.to_rfc3339() });

        let mut prior_query = query.clone();
        prior_query.time_dimensions[td_idx].compare_to_prior_period = false;
        prior_query.time_dimensions[td_idx].date_range =
            Some(DateRangeSpec::Absolute { start: prior.start.to_rfc3339(), end: prior.end.to_rfc3339() });

        let mut current_planned = self.build_single(&current_query, ctx)?;
        let prior_planned = self.build_single(&prior_query, ctx)?;

        current_planned.select_query.select.push(SelectItem {
            expr: SqlExpr::Literal(json!("current")),
            alias: Some("__period".to_string()),
        });
        let mut prior_select = prior_planned.select_query;
        prior_select
            .select
            .push(SelectItem { expr: SqlExpr::Literal(json!("prior")), alias: Some("__period".to_string()) });

        current_planned.select_query.union_all.push(prior_select);
        current_planned.warnings.extend(prior_planned.warnings);

        Ok(current_planned)
    }

    fn build_single(&self, query: &SemanticQuery, ctx: &QueryContext) -> Result<PlannedQuery, CoreError> {
        let base_cube = self.determine_base_cube(query)?;
        let mut required_cubes: BTreeSet<String> = BTreeSet::new();
        for field in query.referenced_fields() {
            let (cube, _) = split_field(&field)?;
            required_cubes.insert(cube.to_string());
        }

        let join_plan = plan_joins(self.registry, &base_cube, &required_cubes)?;
        let mut warnings: Vec<QueryWarning> = join_plan
            .fan_out_cubes
            .iter()
            .map(|c| QueryWarning::FanOut { cube: c.clone() })
            .collect();

        let mut inner = SelectQuery::default();
        let base = require_cube(self.registry, &base_cube)?;
        inner.from = TableRef { name: base.sql_table.clone(), alias: Some(base_cube.clone()), subquery: None };

        for pj in &join_plan.joins {
            let target = require_cube(self.registry, &pj.to_cube)?;
            // The undirected join graph may have walked this edge backward:
            // `pj.join.target_cube` still names whichever cube originally
            // declared it, so `source_column`/`target_column` are qualified
            // under that cube regardless of which side BFS reached first.
            let forward = pj.join.target_cube == pj.to_cube;
            let on = pj
                .join
                .on
                .iter()
                .map(|k| {
                    let (left_cube, right_cube) =
                        if forward { (&pj.from_cube, &pj.to_cube) } else { (&pj.to_cube, &pj.from_cube) };
                    SqlExpr::BinaryOp {
                        op: SqlBinaryOperator::Eq,
                        left: Box::new(SqlExpr::Column { table: Some(left_cube.clone()), name: k.source_column.clone() }),
                        right: Box::new(SqlExpr::Column { table: Some(right_cube.clone()), name: k.target_column.clone() }),
                    }
                })
                .collect();
            inner.joins.push(SqlJoin {
                join_type: pj.sql_join_type,
                table: TableRef { name: target.sql_table.clone(), alias: Some(pj.to_cube.clone()), subquery: None },
                lateral: false,
                on,
            });
        }

        for cube_name in &required_cubes {
            let cube = require_cube(self.registry, cube_name)?;
            if let Some(base_where) = &cube.base_where {
                inner.filters.push(sqlref_to_sqlexpr(base_where, cube_name, &ctx.security)?);
            }
        }

        let mut projected_dims: Vec<String> = Vec::new();
        for dim_field in &query.dimensions {
            let (cube_name, dim_name) = split_field(dim_field)?;
            let expr = resolve_dimension(self.registry, dim_field, &ctx.security)?;
            let alias = projected_alias(cube_name, dim_name);
            inner.select.push(SelectItem { expr: expr.clone(), alias: Some(alias.clone()) });
            inner.group_by.push(expr);
            projected_dims.push(alias);
        }

        for td in &query.time_dimensions {
            let (cube_name, dim_name) = split_field(&td.dimension)?;
            let base_expr = resolve_dimension(self.registry, &td.dimension, &ctx.security)?;
            let alias = projected_alias(cube_name, dim_name);
            let bucketed = match &td.granularity {
                Some(gran) => {
                    let g = Granularity::parse(gran)?;
                    SqlExpr::Function { func: g.trunc_function(), args: vec![base_expr.clone()] }
                }
                None => base_expr.clone(),
            };
            inner.select.push(SelectItem { expr: bucketed.clone(), alias: Some(alias.clone()) });
            inner.group_by.push(bucketed);
            projected_dims.push(alias);

            if let Some(spec) = &td.date_range {
                let range = parse_date_range(spec, ctx.now)?;
                inner.filters.push(SqlExpr::BinaryOp {
                    op: SqlBinaryOperator::And,
                    left: Box::new(SqlExpr::BinaryOp {
                        op: SqlBinaryOperator::Gte,
                        left: Box::new(base_expr.clone()),
                        right: Box::new(SqlExpr::Literal(json!(range.start.to_rfc3339()))),
                    }),
                    right: Box::new(SqlExpr::BinaryOp {
                        op: SqlBinaryOperator::Lte,
                        left: Box::new(base_expr.clone()),
                        right: Box::new(SqlExpr::Literal(json!(range.end.to_rfc3339()))),
                    }),
                });
            }
        }

        // Split measures by stage.
        let mut simple_aliases: Vec<(String, String)> = Vec::new(); // (full field, alias)
        let mut calculated: Vec<(String, String, CalcAst)> = Vec::new();
        let mut windowed: Vec<(String, String, String, crate::model::WindowSpec)> = Vec::new(); // (field, alias, cube_name, spec)
        let mut numeric_fields: Vec<String> = Vec::new();

        for measure_field in &query.measures {
            let (cube_name, measure_name) = split_field(measure_field)?;
            let (cube, measure) = resolve_measure(self.registry, measure_field)?;
            let alias = projected_alias(cube_name, measure_name);
            match &measure.kind {
                MeasureKind::Simple { .. } => {
                    let resolve_filter_field = |f: &str| resolve_dimension(self.registry, f, &ctx.security);
                    let item = build_simple_measure_select(cube, measure, &resolve_filter_field, &ctx.security)?;
                    inner.select.push(item);
                    simple_aliases.push((measure_field.clone(), alias.clone()));
                    numeric_fields.push(alias);
                }
                MeasureKind::Calculated { ast, .. } => {
                    calculated.push((measure_field.clone(), alias.clone(), ast.clone()));
                    numeric_fields.push(alias.clone());
                }
                MeasureKind::Window(spec) => {
                    windowed.push((measure_field.clone(), alias.clone(), cube_name.to_string(), spec.clone()));
                    numeric_fields.push(alias.clone());
                }
            }
        }

        // Calculated measures need every sibling measure they (transitively,
        // through other calculated measures) reference also present in the
        // inner aggregation, even if the caller didn't ask for it directly.
        for (field, _, ast) in &calculated {
            let mut visiting = vec![field.clone()];
            self.collect_calc_dependencies(&base_cube, ast, &mut visiting, &mut simple_aliases, &mut inner, &ctx.security)?;
        }

        // Windowed measures always need their own source measure projected
        // in the inner aggregation, since the outer stage's window function
        // reads it by column, not by re-deriving the aggregate.
        for (_, _, cube_name, spec) in &windowed {
            let full = format!("{cube_name}.{}", spec.source_measure);
            if simple_aliases.iter().any(|(f, _)| f == &full) {
                continue;
            }
            let (cube, measure) = resolve_measure(self.registry, &full).map_err(|_| CoreError::IncompatibleWindow(full.clone()))?;
            let MeasureKind::Simple { .. } = &measure.kind else {
                return Err(CoreError::IncompatibleWindow(full));
            };
            let resolve_filter_field = |f: &str| resolve_dimension(self.registry, f, &ctx.security);
            let item = build_simple_measure_select(cube, measure, &resolve_filter_field, &ctx.security)?;
            inner.select.push(item);
            simple_aliases.push((full, projected_alias(&cube.name, &measure.name)));
        }

        // Filters: members that are aggregate measures go to HAVING against
        // the aggregate expression itself; everything else goes to WHERE.
        let resolve_where_field = |f: &str| -> Result<SqlExpr, CoreError> {
            let (cube, field) = split_field(f)?;
            resolve_dimension(self.registry, &format!("{cube}.{field}"), &ctx.security)
        };
        let (where_conditions, having_conditions) = self.split_filters_by_aggregate(&query.filters)?;
        if let Some(expr) = build_filters(&where_conditions, &resolve_where_field)? {
            inner.filters.push(expr);
        }
        if let Some(expr) = self.build_having(&having_conditions, &ctx.security)? {
            inner.having.push(expr);
        }

        let has_outer_stage = !calculated.is_empty() || !windowed.is_empty();

        if !has_outer_stage {
            inner.order_by = self.build_order_items(&query.order, &projected_dims, &simple_aliases)?;
            inner.limit = query.limit;
            inner.offset = query.offset;
            return Ok(PlannedQuery { select_query: inner, numeric_fields, warnings });
        }

        // Outer stage: project every inner column through, then add
        // calculated/window measures computed against inner's aliases.
        let mut outer = SelectQuery::default();
        for dim_alias in &projected_dims {
            outer.select.push(SelectItem {
                expr: SqlExpr::Column { table: None, name: dim_alias.clone() },
                alias: None,
            });
        }
        for (_, alias) in &simple_aliases {
            outer.select.push(SelectItem { expr: SqlExpr::Column { table: None, name: alias.clone() }, alias: None });
        }
        for (field, alias, ast) in &calculated {
            let mut visiting = vec![field.clone()];
            let expr = calc_ast_to_sqlexpr(self.registry, ast, &simple_aliases, &base_cube, &mut visiting)?;
            outer.select.push(SelectItem { expr, alias: Some(alias.clone()) });
        }
        for (_, alias, cube_name, spec) in &windowed {
            let source_alias = projected_alias(cube_name, &spec.source_measure);
            let order_by = spec
                .order_by
                .iter()
                .map(|o| SqlOrderItem {
                    expr: SqlExpr::Column { table: None, name: o.field.replace('.', "__") },
                    direction: o.direction,
                })
                .collect();
            outer.select.push(SelectItem {
                expr: SqlExpr::Window {
                    kind: spec.kind,
                    op: spec.op,
                    source: Box::new(SqlExpr::Column { table: None, name: source_alias }),
                    order_by,
                    frame: spec.frame.as_ref().map(render_window_frame),
                },
                alias: Some(alias.clone()),
            });
        }

        outer.from = TableRef { name: String::new(), alias: Some("agg".to_string()), subquery: Some(Box::new(inner)) };
        outer.order_by = self.build_order_items(&query.order, &projected_dims, &simple_aliases)?;
        outer.limit = query.limit;
        outer.offset = query.offset;

        Ok(PlannedQuery { select_query: outer, numeric_fields, warnings })
    }

    /// Walks a calculated measure's formula, recursively pulling in every
    /// sibling measure it references: a `Simple` sibling gets projected into
    /// the inner aggregation directly; a `Calculated` sibling is expanded
    /// in turn (its own dependencies collected before it's usable); a
    /// `Window` sibling is rejected, since the inner aggregation has no
    /// row-ordered context to compute one. `visiting` detects a measure
    /// referencing itself, directly or through a chain of other calculated
    /// measures.
    fn collect_calc_dependencies(
        &self,
        base_cube: &str,
        ast: &CalcAst,
        visiting: &mut Vec<String>,
        simple_aliases: &mut Vec<(String, String)>,
        inner: &mut SelectQuery,
        security: &SecurityContext,
    ) -> Result<(), CoreError> {
        let mut refs = Vec::new();
        ast.referenced_measures(&mut refs);
        for sibling in refs {
            let full = if sibling.contains('.') { sibling.clone() } else { format!("{base_cube}.{sibling}") };
            if simple_aliases.iter().any(|(f, _)| f == &full || field_short_name(f) == sibling) {
                continue;
            }
            if visiting.contains(&full) {
                return Err(CoreError::CalcCycle(full));
            }
            let (cube, measure) = resolve_measure(self.registry, &full)
                .map_err(|_| CoreError::CalcUnresolved { measure: full.clone(), reference: sibling.clone() })?;
            match &measure.kind {
                MeasureKind::Simple { .. } => {
                    let resolve_filter_field = |f: &str| resolve_dimension(self.registry, f, security);
                    let item = build_simple_measure_select(cube, measure, &resolve_filter_field, security)?;
                    inner.select.push(item);
                    simple_aliases.push((full, projected_alias(&cube.name, &measure.name)));
                }
                MeasureKind::Calculated { ast: nested_ast, .. } => {
                    visiting.push(full);
                    self.collect_calc_dependencies(base_cube, nested_ast, visiting, simple_aliases, inner, security)?;
                    visiting.pop();
                }
                MeasureKind::Window(_) => {
                    return Err(CoreError::IncompatibleWindow(full));
                }
            }
        }
        Ok(())
    }

    fn determine_base_cube(&self, query: &SemanticQuery) -> Result<String, CoreError> {
        if let Some(m) = query.measures.first() {
            return Ok(split_field(m)?.0.to_string());
        }
        if let Some(d) = query.dimensions.first() {
            return Ok(split_field(d)?.0.to_string());
        }
        if let Some(td) = query.time_dimensions.first() {
            return Ok(split_field(&td.dimension)?.0.to_string());
        }
        Err(CoreError::Other(anyhow::anyhow!("cannot determine a base cube from an empty query")))
    }

    fn split_filters_by_aggregate(&self, filters: &[FilterCondition]) -> Result<(Vec<FilterCondition>, Vec<FilterCondition>), CoreError> {
        let mut where_conditions = Vec::new();
        let mut having_conditions = Vec::new();
        for cond in filters {
            if self.references_measure(cond)? {
                having_conditions.push(cond.clone());
            } else {
                where_conditions.push(cond.clone());
            }
        }
        Ok((where_conditions, having_conditions))
    }

    fn references_measure(&self, cond: &FilterCondition) -> Result<bool, CoreError> {
        match cond {
            FilterCondition::Leaf(leaf) => {
                let (cube_name, field_name) = split_field(&leaf.member)?;
                let cube = require_cube(self.registry, cube_name)?;
                Ok(cube.measures.contains_key(field_name))
            }
            FilterCondition::Group { group } => match group {
                crate::query::FilterGroup::And(inner) | crate::query::FilterGroup::Or(inner) => {
                    for c in inner {
                        if self.references_measure(c)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            },
        }
    }

    fn build_having(&self, conditions: &[FilterCondition], security: &SecurityContext) -> Result<Option<SqlExpr>, CoreError> {
        let resolve = |f: &str| -> Result<SqlExpr, CoreError> {
            let (cube_name, measure_name) = split_field(f)?;
            let (cube, measure) = resolve_measure(self.registry, f)?;
            let MeasureKind::Simple { sql, agg } = &measure.kind else {
                return Err(CoreError::Other(anyhow::anyhow!("HAVING on non-simple measure '{}.{}' is unsupported", cube_name, measure_name)));
            };
            let inner = sqlref_to_sqlexpr(sql, &cube.name, security)?;
            Ok(SqlExpr::Aggregate { agg: *agg, expr: Box::new(inner), filter: None })
        };
        build_filters(conditions, &resolve)
    }

    fn build_order_items(
        &self,
        order: &[crate::query::OrderItem],
        projected_dims: &[String],
        simple_aliases: &[(String, String)],
    ) -> Result<Vec<SqlOrderItem>, CoreError> {
        let mut items = Vec::with_capacity(order.len());
        for o in order {
            let (cube_name, field_name) = split_field(&o.field)?;
            let alias = projected_alias(cube_name, field_name);
            if !projected_dims.contains(&alias) && !simple_aliases.iter().any(|(_, a)| a == &alias) {
                return Err(CoreError::InvalidOrderField(o.field.clone()));
            }
            items.push(SqlOrderItem { expr: SqlExpr::Column { table: None, name: alias }, direction: o.direction });
        }
        Ok(items)
    }
}

fn field_short_name(field: &str) -> String {
    split_field(field).map(|(_, f)| f.to_string()).unwrap_or_else(|_| field.to_string())
}

fn render_frame_bound(bound: FrameBound, is_start: bool) -> String {
    match bound {
        FrameBound::Unbounded => {
            if is_start {
                "UNBOUNDED PRECEDING".to_string()
            } else {
                "UNBOUNDED FOLLOWING".to_string()
            }
        }
        FrameBound::Current => "CURRENT ROW".to_string(),
        FrameBound::Preceding(n) => format!("{n} PRECEDING"),
    }
}

/// Translate a declared `WindowFrame` into the `ROWS BETWEEN ... AND ...`
/// fragment `Dialect::render_window` expects to already be complete SQL text.
fn render_window_frame(frame: &WindowFrame) -> String {
    format!("ROWS BETWEEN {} AND {}", render_frame_bound(frame.start, true), render_frame_bound(frame.end, false))
}

/// Rewrite a parsed calculated-measure formula into a `SqlExpr` whose
/// `MeasureRef`s point at the inner stage's already-aggregated column
/// aliases, never re-deriving the aggregate. A reference to another
/// calculated measure is expanded recursively in place; `visiting` detects a
/// cycle through that expansion.
fn calc_ast_to_sqlexpr(
    registry: &CubeRegistry,
    ast: &CalcAst,
    simple_aliases: &[(String, String)],
    base_cube: &str,
    visiting: &mut Vec<String>,
) -> Result<SqlExpr, CoreError> {
    Ok(match ast {
        CalcAst::MeasureRef { name } => {
            let full = if name.contains('.') { name.clone() } else { format!("{base_cube}.{name}") };
            if let Some((_, alias)) = simple_aliases.iter().find(|(f, _)| f == &full || field_short_name(f) == *name) {
                return Ok(SqlExpr::Column { table: None, name: alias.clone() });
            }
            if visiting.contains(&full) {
                return Err(CoreError::CalcCycle(full));
            }
            let (_, measure) = resolve_measure(registry, &full)
                .map_err(|_| CoreError::CalcUnresolved { measure: full.clone(), reference: name.clone() })?;
            match &measure.kind {
                MeasureKind::Calculated { ast: nested, .. } => {
                    visiting.push(full);
                    let expr = calc_ast_to_sqlexpr(registry, nested, simple_aliases, base_cube, visiting)?;
                    visiting.pop();
                    expr
                }
                MeasureKind::Window(_) => return Err(CoreError::IncompatibleWindow(full)),
                MeasureKind::Simple { .. } => SqlExpr::Column { table: None, name: full.replace('.', "__") },
            }
        }
        CalcAst::Literal { value } => SqlExpr::Literal(value.clone()),
        CalcAst::Binary { op, left, right } => {
            let sql_op = match op {
                CalcOp::Add => SqlBinaryOperator::Add,
                CalcOp::Subtract => SqlBinaryOperator::Subtract,
                CalcOp::Multiply => SqlBinaryOperator::Multiply,
                CalcOp::Divide => SqlBinaryOperator::Divide,
            };
            SqlExpr::BinaryOp {
                op: sql_op,
                left: Box::new(calc_ast_to_sqlexpr(registry, left, simple_aliases, base_cube, visiting)?),
                right: Box::new(calc_ast_to_sqlexpr(registry, right, simple_aliases, base_cube, visiting)?),
            }
        }
        CalcAst::Call { func, args } => {
            let rendered: Vec<SqlExpr> = args
                .iter()
                .map(|a| calc_ast_to_sqlexpr(registry, a, simple_aliases, base_cube, visiting))
                .collect::<Result<_, _>>()?;
            calc_function_to_sqlexpr(*func, rendered)
        }
    })
}

fn calc_function_to_sqlexpr(func: CalcFunction, args: Vec<SqlExpr>) -> SqlExpr {
    use crate::expr::SqlFunction;
    let sql_func = match func {
        CalcFunction::Round => SqlFunction::Round,
        CalcFunction::Coalesce => SqlFunction::Coalesce,
        CalcFunction::NullIf => SqlFunction::NullIf,
        CalcFunction::Abs => SqlFunction::Abs,
        CalcFunction::Greatest => SqlFunction::Greatest,
        CalcFunction::Least => SqlFunction::Least,
        CalcFunction::SafeDivide => SqlFunction::SafeDivide,
    };
    SqlExpr::Function { func: sql_func, args }
}
