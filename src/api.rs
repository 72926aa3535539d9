//! The public façade an embedder (HTTP handler, CLI, notebook binding) talks
//! to: one struct bundling the registry, connection manager and config, with
//! methods named exactly after the operations an embedder needs.
//!
//! Grounded on the teacher's top-level `load_and_validate` + ad-hoc
//! `SqlBuilder`/`ConnectionManager` pairing in `lib.rs`, consolidated into a
//! single `SemanticEngine` struct so callers don't have to wire the registry,
//! dialect and connection manager together themselves on every call.

use serde::Serialize;
use serde_json::Value;

use crate::backends::ConnectionManager;
use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::executor::{self, DryRunResult, ExecutionContext, ResultSet};
use crate::explain::{ExplainResult, IndexInfo};
use crate::flow_planner::FlowPlanner;
use crate::model::{CubeDescriptor, SortDirection};
use crate::query::{OrderItem, QueryContext, SemanticQuery};
use crate::query_builder::resolve::split_field;
use crate::query_builder::{self, QueryWarning};
use crate::registry::CubeRegistry;

/// The compiled-but-not-executed shape `compile()` returns.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub numeric_fields: Vec<String>,
    pub warnings: Vec<QueryWarning>,
}

/// One registered datasource: its backend connection plus the dialect it
/// speaks, looked up by name from the embedder-supplied `ConnectionManager`.
pub struct SemanticEngine {
    registry: CubeRegistry,
    connections: ConnectionManager,
}

impl SemanticEngine {
    pub fn new(registry: CubeRegistry, connections: ConnectionManager) -> Self {
        Self { registry, connections }
    }

    pub fn with_config(registry: CubeRegistry, connections: ConnectionManager, config: EngineConfig) -> Self {
        let mut connections = connections;
        if connections.config().is_none() {
            connections = ConnectionManager::with_config(config);
        }
        Self { registry, connections }
    }

    pub fn registry(&self) -> &CubeRegistry {
        &self.registry
    }

    fn connection(&self, datasource: &str) -> Result<&std::sync::Arc<dyn crate::backends::BackendConnection>> {
        self.connections
            .get(datasource)
            .ok_or_else(|| CoreError::Other(anyhow::anyhow!("unknown datasource: {datasource}")))
    }

    /// Cube descriptors for ERD/chart clients: names, titles, typed
    /// dimensions and measures, hierarchies, and outbound join relationships.
    pub fn metadata(&self) -> Vec<CubeDescriptor> {
        self.registry.metadata()
    }

    /// Compile a query to its rendered SQL and bound parameters without
    /// touching a driver.
    pub fn compile(&self, datasource: &str, query: &SemanticQuery, ctx: &QueryContext) -> Result<CompiledQuery> {
        let conn = self.connection(datasource)?;
        let (sql, params, planned) = query_builder::compile(&self.registry, conn.dialect(), query, ctx)?;
        Ok(CompiledQuery { sql, params, numeric_fields: planned.numeric_fields, warnings: planned.warnings })
    }

    /// Compile and run a query, applying the executor's numeric coercion.
    pub async fn execute(
        &self,
        datasource: &str,
        query: &SemanticQuery,
        ctx: &QueryContext,
        exec_ctx: &ExecutionContext,
    ) -> Result<ResultSet> {
        let conn = self.connection(datasource)?;
        let (sql, params, planned) = query_builder::compile(&self.registry, conn.dialect(), query, ctx)?;
        executor::execute(conn.as_ref(), &sql, &params, &planned, exec_ctx).await
    }

    /// Compile without executing — same shape as `compile`, phrased as the
    /// explicit "don't touch the database" entry point embedders expect.
    pub fn dry_run(&self, datasource: &str, query: &SemanticQuery, ctx: &QueryContext) -> Result<DryRunResult> {
        let conn = self.connection(datasource)?;
        let (sql, params, planned) = query_builder::compile(&self.registry, conn.dialect(), query, ctx)?;
        Ok(executor::dry_run(sql, params, planned.warnings))
    }

    /// Compile, run `EXPLAIN`/`EXPLAIN ANALYZE`, and parse the driver's plan
    /// into the common `ExplainResult` tree.
    pub async fn explain(&self, datasource: &str, query: &SemanticQuery, ctx: &QueryContext, analyze: bool) -> Result<ExplainResult> {
        let conn = self.connection(datasource)?;
        let (sql, params, _) = query_builder::compile(&self.registry, conn.dialect(), query, ctx)?;
        executor::explain(conn.as_ref(), &sql, &params, analyze).await
    }

    /// Index metadata for the given tables, normalized across engines.
    pub async fn table_indexes(&self, datasource: &str, tables: &[String]) -> Result<Vec<IndexInfo>> {
        let conn = self.connection(datasource)?;
        executor::table_indexes(conn.as_ref(), tables).await
    }

    /// Ordered, deduplicated, non-null values of a cube-qualified dimension —
    /// consumed by the external AI assistant to ground its own query
    /// suggestions against real data.
    pub async fn distinct_values(
        &self,
        datasource: &str,
        dimension: &str,
        ctx: &QueryContext,
        limit: u64,
    ) -> Result<Vec<Value>> {
        let (cube_name, field_name) = split_field(dimension)?;
        if self.registry.get(cube_name).and_then(|c| c.dimensions.get(field_name)).is_none() {
            return Err(CoreError::MetaUnavailable(dimension.to_string()));
        }

        let query = SemanticQuery {
            dimensions: vec![dimension.to_string()],
            measures: vec![],
            filters: vec![],
            time_dimensions: vec![],
            order: vec![OrderItem { field: dimension.to_string(), direction: SortDirection::Asc }],
            limit: Some(limit),
            offset: None,
            flow: None,
        };

        let conn = self.connection(datasource)?;
        let (sql, params, planned) = query_builder::compile(&self.registry, conn.dialect(), &query, ctx)?;
        let exec_ctx = ExecutionContext::default();
        let result = executor::execute(conn.as_ref(), &sql, &params, &planned, &exec_ctx).await?;
        let alias = planned
            .select_query
            .select
            .first()
            .and_then(|item| item.alias.clone())
            .unwrap_or_else(|| dimension.replace('.', "__"));
        Ok(result.rows.into_iter().filter_map(|mut row| row.remove(&alias)).filter(|v| !v.is_null()).collect())
    }

    /// Plan and render a flow (Sankey/sunburst) query against the given
    /// datasource's dialect.
    pub fn compile_flow(
        &self,
        datasource: &str,
        config: &crate::query::FlowQueryConfig,
        sunburst: bool,
    ) -> Result<(String, Vec<Value>, Vec<QueryWarning>)> {
        let conn = self.connection(datasource)?;
        let planner = FlowPlanner::new(&self.registry, conn.dialect());
        planner.plan(config, sunburst)
    }
}
