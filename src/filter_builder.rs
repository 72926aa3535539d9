//! Translates a `FilterCondition` tree into a `SqlExpr`, given a resolver
//! that turns a `cube.field` name into its already-qualified column
//! expression. Grounded on the teacher's `query_builder::filters::render_filter_expr`,
//! generalized from a flat filter list to the nested and/or grouping shape
//! and widened to the public filter operator vocabulary.

use serde_json::Value;

use crate::error::CoreError;
use crate::query::{FilterCondition, FilterGroup, FilterOp, LeafFilter};
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

/// Build the combined `SqlExpr` for a list of top-level filter conditions,
/// implicitly AND-ed together — the shape a query's `filters: [...]` list
/// takes. Returns `None` when the list is empty.
pub fn build_filters<F>(conditions: &[FilterCondition], resolve: &F) -> Result<Option<SqlExpr>, CoreError>
where
    F: Fn(&str) -> Result<SqlExpr, CoreError>,
{
    let mut rendered = Vec::with_capacity(conditions.len());
    for cond in conditions {
        rendered.push(build_condition(cond, resolve)?);
    }
    Ok(collapse(rendered, SqlBinaryOperator::And))
}

fn build_condition<F>(condition: &FilterCondition, resolve: &F) -> Result<SqlExpr, CoreError>
where
    F: Fn(&str) -> Result<SqlExpr, CoreError>,
{
    match condition {
        FilterCondition::Leaf(leaf) => build_leaf(leaf, resolve),
        FilterCondition::Group { group } => match group {
            FilterGroup::And(inner) => {
                let rendered: Result<Vec<_>, _> = inner.iter().map(|c| build_condition(c, resolve)).collect();
                Ok(collapse(rendered?, SqlBinaryOperator::And).unwrap_or(SqlExpr::Raw("TRUE".to_string())))
            }
            FilterGroup::Or(inner) => {
                let rendered: Result<Vec<_>, _> = inner.iter().map(|c| build_condition(c, resolve)).collect();
                Ok(collapse(rendered?, SqlBinaryOperator::Or).unwrap_or(SqlExpr::Raw("TRUE".to_string())))
            }
        },
    }
}

/// Fold a list of expressions into a single left-associative binary tree
/// joined by `op`. A one-element list collapses to that element directly, so
/// a lone grouping never grows a redundant `(x AND)`.
fn collapse(mut exprs: Vec<SqlExpr>, op: SqlBinaryOperator) -> Option<SqlExpr> {
    if exprs.is_empty() {
        return None;
    }
    let mut acc = exprs.remove(0);
    for expr in exprs {
        acc = SqlExpr::BinaryOp { op, left: Box::new(acc), right: Box::new(expr) };
    }
    Some(acc)
}

fn build_leaf<F>(leaf: &LeafFilter, resolve: &F) -> Result<SqlExpr, CoreError>
where
    F: Fn(&str) -> Result<SqlExpr, CoreError>,
{
    let column = resolve(&leaf.member)?;
    match leaf.operator {
        FilterOp::Set => Ok(SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Neq,
            left: Box::new(column),
            right: Box::new(SqlExpr::Literal(Value::Null)),
        }),
        FilterOp::NotSet => Ok(SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(column),
            right: Box::new(SqlExpr::Literal(Value::Null)),
        }),
        FilterOp::Equals if leaf.values.len() > 1 => Ok(SqlExpr::InList {
            expr: Box::new(column),
            list: leaf.values.iter().cloned().map(SqlExpr::Literal).collect(),
            negated: false,
        }),
        FilterOp::NotEquals if leaf.values.len() > 1 => Ok(SqlExpr::InList {
            expr: Box::new(column),
            list: leaf.values.iter().cloned().map(SqlExpr::Literal).collect(),
            negated: true,
        }),
        FilterOp::Equals => binary(column, SqlBinaryOperator::Eq, single_value(leaf)?),
        FilterOp::NotEquals => binary(column, SqlBinaryOperator::Neq, single_value(leaf)?),
        FilterOp::Gt => binary(column, SqlBinaryOperator::Gt, single_value(leaf)?),
        FilterOp::Gte => binary(column, SqlBinaryOperator::Gte, single_value(leaf)?),
        FilterOp::Lt => binary(column, SqlBinaryOperator::Lt, single_value(leaf)?),
        FilterOp::Lte => binary(column, SqlBinaryOperator::Lte, single_value(leaf)?),
        FilterOp::Contains => binary(column, SqlBinaryOperator::Like, wrap_wildcard(&single_value(leaf)?, true, true)),
        FilterOp::NotContains => {
            let like = binary(column, SqlBinaryOperator::Like, wrap_wildcard(&single_value(leaf)?, true, true))?;
            Ok(negate(like))
        }
        FilterOp::StartsWith => {
            let v = single_value(leaf)?;
            let col = resolve(&leaf.member)?;
            binary(col, SqlBinaryOperator::Like, wrap_wildcard(&v, false, true))
        }
        FilterOp::EndsWith => {
            let v = single_value(leaf)?;
            let col = resolve(&leaf.member)?;
            binary(col, SqlBinaryOperator::Like, wrap_wildcard(&v, true, false))
        }
        FilterOp::InDateRange => Err(CoreError::Other(anyhow::anyhow!(
            "in_date_range must be expressed via a time dimension request, not a plain filter"
        ))),
    }
}

fn single_value(leaf: &LeafFilter) -> Result<SqlExpr, CoreError> {
    leaf.values
        .first()
        .cloned()
        .map(SqlExpr::Literal)
        .ok_or_else(|| CoreError::Other(anyhow::anyhow!("filter on '{}' is missing a value", leaf.member)))
}

fn wrap_wildcard(expr: &SqlExpr, prefix: bool, suffix: bool) -> SqlExpr {
    let SqlExpr::Literal(Value::String(s)) = expr else {
        return expr.clone();
    };
    let escaped = s.replace('%', "\\%").replace('_', "\\_");
    let wrapped = match (prefix, suffix) {
        (true, true) => format!("%{escaped}%"),
        (false, true) => format!("{escaped}%"),
        (true, false) => format!("%{escaped}"),
        (false, false) => escaped,
    };
    SqlExpr::Literal(Value::String(wrapped))
}

fn binary(left: SqlExpr, op: SqlBinaryOperator, right: SqlExpr) -> Result<SqlExpr, CoreError> {
    Ok(SqlExpr::BinaryOp { op, left: Box::new(left), right: Box::new(right) })
}

fn negate(expr: SqlExpr) -> SqlExpr {
    SqlExpr::Case {
        branches: vec![(expr, SqlExpr::Literal(Value::Bool(false)))],
        else_expr: Box::new(SqlExpr::Literal(Value::Bool(true))),
    }
}
