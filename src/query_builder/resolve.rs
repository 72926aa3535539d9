//! Splits `cube.field` references and turns a declared `SqlRef` into the
//! compiled, table-qualified `SqlExpr` a query plan can render.
//!
//! Grounded on the teacher's `query_builder::resolve::build_alias_map` (the
//! same split-then-lookup shape), adapted to the cube-owns-its-joins model:
//! there is no separate alias map to build, the cube name doubles as its own
//! table alias.

use crate::error::CoreError;
use crate::expr::{SqlRef, SqlRefOp};
use crate::model::Cube;
use crate::query::SecurityContext;
use crate::registry::CubeRegistry;
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

/// Split `"orders.status"` into `("orders", "status")`.
pub fn split_field(field: &str) -> Result<(&str, &str), CoreError> {
    field.split_once('.').ok_or_else(|| CoreError::UnknownField(field.to_string()))
}

pub fn require_cube<'a>(registry: &'a CubeRegistry, cube_name: &str) -> Result<&'a Cube, CoreError> {
    registry.get(cube_name).ok_or_else(|| CoreError::UnknownField(cube_name.to_string()))
}

/// Resolve a dimension reference into its compiled column expression,
/// qualified by the owning cube's name (used directly as its table alias).
pub fn resolve_dimension(registry: &CubeRegistry, field: &str, security: &SecurityContext) -> Result<SqlExpr, CoreError> {
    let (cube_name, dim_name) = split_field(field)?;
    let cube = require_cube(registry, cube_name)?;
    let dim = cube.dimensions.get(dim_name).ok_or_else(|| CoreError::UnknownField(field.to_string()))?;
    sqlref_to_sqlexpr(&dim.sql, cube_name, security)
}

/// Resolve a measure reference to its owning cube and declaration, without
/// building the aggregate expression — callers decide how to project it
/// (simple aggregate, calculated, or window) based on `MeasureKind`.
pub fn resolve_measure<'a>(registry: &'a CubeRegistry, field: &str) -> Result<(&'a Cube, &'a crate::model::Measure), CoreError> {
    let (cube_name, measure_name) = split_field(field)?;
    let cube = require_cube(registry, cube_name)?;
    let measure = cube.measures.get(measure_name).ok_or_else(|| CoreError::UnknownField(field.to_string()))?;
    Ok((cube, measure))
}

/// Resolve any `cube.field` reference (dimension or measure) to its column
/// expression for use in contexts that don't care which it is (e.g. ORDER BY
/// referencing a projected alias).
pub fn resolve_any_field(registry: &CubeRegistry, field: &str, security: &SecurityContext) -> Result<SqlExpr, CoreError> {
    let (cube_name, field_name) = split_field(field)?;
    let cube = require_cube(registry, cube_name)?;
    if let Some(dim) = cube.dimensions.get(field_name) {
        return sqlref_to_sqlexpr(&dim.sql, cube_name, security);
    }
    if cube.measures.contains_key(field_name) {
        // Measures are referenced by their output alias once projected, not
        // by re-deriving the aggregate here.
        return Ok(SqlExpr::Column { table: None, name: field.replace('.', "__") });
    }
    Err(CoreError::UnknownField(field.to_string()))
}

/// Convert a declared, dialect-neutral `SqlRef` into the compiled `SqlExpr`
/// the renderer walks, qualifying bare columns with `table_alias`. Fallible:
/// a `SqlRef::SecurityContext` reference that the caller's context doesn't
/// carry is a hard error, not a silently-missing predicate.
pub fn sqlref_to_sqlexpr(sql_ref: &SqlRef, table_alias: &str, security: &SecurityContext) -> Result<SqlExpr, CoreError> {
    Ok(match sql_ref {
        SqlRef::Column { column } => SqlExpr::Column { table: Some(table_alias.to_string()), name: column.clone() },
        SqlRef::Literal { value } => SqlExpr::Literal(value.clone()),
        SqlRef::SecurityContext { key } => {
            let value = security.get(key).ok_or_else(|| CoreError::SecurityContextMissing(key.clone()))?;
            SqlExpr::Literal(value.clone())
        }
        SqlRef::Func { func, args } => SqlExpr::Function {
            func: *func,
            args: args.iter().map(|a| sqlref_to_sqlexpr(a, table_alias, security)).collect::<Result<_, _>>()?,
        },
        SqlRef::Case { branches, else_expr } => SqlExpr::Case {
            branches: branches
                .iter()
                .map(|b| {
                    Ok::<_, CoreError>((
                        sqlref_to_sqlexpr(&b.when, table_alias, security)?,
                        sqlref_to_sqlexpr(&b.then, table_alias, security)?,
                    ))
                })
                .collect::<Result<_, _>>()?,
            else_expr: Box::new(sqlref_to_sqlexpr(else_expr, table_alias, security)?),
        },
        SqlRef::Binary { op, left, right } => SqlExpr::BinaryOp {
            op: sqlref_op_to_sql(*op),
            left: Box::new(sqlref_to_sqlexpr(left, table_alias, security)?),
            right: Box::new(sqlref_to_sqlexpr(right, table_alias, security)?),
        },
    })
}

fn sqlref_op_to_sql(op: SqlRefOp) -> SqlBinaryOperator {
    match op {
        SqlRefOp::Add => SqlBinaryOperator::Add,
        SqlRefOp::Subtract => SqlBinaryOperator::Subtract,
        SqlRefOp::Multiply => SqlBinaryOperator::Multiply,
        SqlRefOp::Divide => SqlBinaryOperator::Divide,
        SqlRefOp::Modulo => SqlBinaryOperator::Modulo,
        SqlRefOp::Eq => SqlBinaryOperator::Eq,
        SqlRefOp::Neq => SqlBinaryOperator::Neq,
        SqlRefOp::Gt => SqlBinaryOperator::Gt,
        SqlRefOp::Gte => SqlBinaryOperator::Gte,
        SqlRefOp::Lt => SqlBinaryOperator::Lt,
        SqlRefOp::Lte => SqlBinaryOperator::Lte,
        SqlRefOp::And => SqlBinaryOperator::And,
        SqlRefOp::Or => SqlBinaryOperator::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_field_rejects_unqualified_name() {
        assert!(split_field("status").is_err());
    }

    #[test]
    fn split_field_splits_on_first_dot_only() {
        let (cube, field) = split_field("orders.line_items.sku").unwrap();
        assert_eq!(cube, "orders");
        assert_eq!(field, "line_items.sku");
    }

    #[test]
    fn security_context_ref_resolves_to_a_literal() {
        let mut security = SecurityContext::default();
        security.values.insert("tenant_id".to_string(), serde_json::json!("acme"));
        let sql_ref = SqlRef::SecurityContext { key: "tenant_id".to_string() };
        let expr = sqlref_to_sqlexpr(&sql_ref, "orders", &security).unwrap();
        match expr {
            SqlExpr::Literal(v) => assert_eq!(v, serde_json::json!("acme")),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn security_context_ref_errors_when_key_is_missing() {
        let security = SecurityContext::default();
        let sql_ref = SqlRef::SecurityContext { key: "tenant_id".to_string() };
        let err = sqlref_to_sqlexpr(&sql_ref, "orders", &security).unwrap_err();
        assert_eq!(err.kind(), "query/security-context-missing");
    }
}
