//! Compiles a `SemanticQuery` into a rendered, parameterized SQL statement.
//!
//! Grounded on the teacher's `query_builder::SqlBuilder` as the module's public
//! face, restructured into `resolve` (field lookup), `measures` (simple
//! measure projection), and `plan` (the two-stage assembly and public
//! `QueryPlanner`).

mod measures;
pub mod plan;
pub(crate) mod resolve;

pub use plan::{PlannedQuery, QueryPlanner, QueryWarning};

use crate::dialect::Dialect;
use crate::error::CoreError;
use crate::query::{QueryContext, SemanticQuery};
use crate::registry::CubeRegistry;
use crate::sql_ast::SqlRenderer;

/// Compile a query all the way to rendered SQL text and its bound parameters.
pub fn compile(
    registry: &CubeRegistry,
    dialect: &dyn Dialect,
    query: &SemanticQuery,
    ctx: &QueryContext,
) -> Result<(String, Vec<serde_json::Value>, PlannedQuery), CoreError> {
    let planner = QueryPlanner::new(registry, dialect);
    let planned = planner.plan(query, ctx)?;
    let renderer = SqlRenderer::new(dialect);
    let (sql, params) = renderer.render_select(&planned.select_query);
    Ok((sql, params, planned))
}
