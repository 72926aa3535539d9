//! Compiles a `FlowQueryConfig` into a chain of CTEs producing a Sankey or
//! sunburst node/link dataset.
//!
//! The CTE-chain/UNION ALL shape this module builds doesn't fit the
//! `SelectQuery` IR (which has no `WITH`/`UNION` representation — it models
//! one `SELECT`, as the teacher's `sql_ast` does), so this module composes
//! SQL text directly the way the teacher's `runtime.rs` composes driver
//! commands: every value still goes through a local parameter sink and
//! `dialect.placeholder`, never stringified — only structural keywords,
//! identifiers (via `dialect.quote_ident`), and CTE names are written as text.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::CoreError;
use crate::model::Cube;
use crate::query::{FlowQueryConfig, FlowStrategy};
use crate::query_builder::plan::QueryWarning;
use crate::registry::CubeRegistry;

pub struct FlowPlanner<'d> {
    registry: &'d CubeRegistry,
    dialect: &'d dyn Dialect,
}

struct ParamSink {
    params: Vec<Value>,
}

impl ParamSink {
    fn push(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len() - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowMode {
    Sankey,
    Sunburst,
}

impl<'d> FlowPlanner<'d> {
    pub fn new(registry: &'d CubeRegistry, dialect: &'d dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    pub fn plan(&self, config: &FlowQueryConfig, mode_is_sunburst: bool) -> Result<(String, Vec<Value>, Vec<QueryWarning>), CoreError> {
        if !self.dialect.supports_flow_queries() {
            return Err(CoreError::FlowEngineUnsupported);
        }
        if config.strategy == FlowStrategy::Lateral && !self.dialect.supports_lateral() {
            return Err(CoreError::FlowLateralUnsupported);
        }
        if !(0..=5).contains(&config.steps_before) {
            return Err(CoreError::FlowDepthOutOfRange(config.steps_before));
        }
        if !(0..=5).contains(&config.steps_after) {
            return Err(CoreError::FlowDepthOutOfRange(config.steps_after));
        }
        let starting_step = config.starting_step.as_ref().ok_or(CoreError::FlowMissingStartingStep)?;

        let cube = self
            .registry
            .get(&config.event_stream)
            .ok_or_else(|| CoreError::UnknownField(config.event_stream.clone()))?;
        let meta = cube
            .event_stream
            .as_ref()
            .ok_or_else(|| CoreError::Other(anyhow::anyhow!("cube '{}' is not declared as an event stream", cube.name)))?;
        if !cube.dimensions.contains_key(&config.step_dimension) {
            return Err(CoreError::FlowInvalidDimension(config.step_dimension.clone()));
        }
        for dim in [&meta.binding_key, &meta.time_dimension, &meta.event_dimension] {
            if !cube.dimensions.contains_key(dim) {
                return Err(CoreError::FlowInvalidDimension(dim.clone()));
            }
        }

        let mode = if mode_is_sunburst { FlowMode::Sunburst } else { FlowMode::Sankey };
        let steps_before = config.steps_before;
        let steps_after = config.steps_after;

        let use_lateral = match config.strategy {
            FlowStrategy::Lateral => true,
            FlowStrategy::Window => false,
            FlowStrategy::Auto => self.dialect.supports_lateral(),
        };

        let mut warnings = Vec::new();
        let total_depth = steps_before + steps_after;
        if total_depth >= 4 {
            warnings.push(QueryWarning::HighFlowDepth { depth: total_depth });
        }

        let mut sink = ParamSink { params: Vec::new() };
        let sql = self.render(cube, meta, config, mode, steps_before, steps_after, use_lateral, starting_step, &mut sink)?;
        Ok((sql, sink.params, warnings))
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        cube: &Cube,
        meta: &crate::model::EventStreamMeta,
        config: &FlowQueryConfig,
        mode: FlowMode,
        steps_before: i32,
        steps_after: i32,
        use_lateral: bool,
        starting_step: &Value,
        sink: &mut ParamSink,
    ) -> Result<String, CoreError> {
        let q = |s: &str| self.dialect.quote_ident(s);
        let table = self.dialect.qualify_table(&cube.sql_table);
        let binding_col = q(&meta.binding_key);
        let time_col = q(&meta.time_dimension);
        let event_col = q(&meta.event_dimension);
        let step_col = q(&config.step_dimension);

        let start_idx = sink.push(starting_step.clone());
        let start_ph = self.dialect.placeholder(start_idx);

        let mut ctes = Vec::new();
        ctes.push(format!(
            "starting_entities AS (SELECT {binding_col} AS binding_key, {time_col} AS start_time, {event_col} AS event_type, {event_col} AS event_path FROM {table} WHERE {step_col} = {start_ph})"
        ));

        let node_id_expr = |prefix: &str| -> String {
            match mode {
                FlowMode::Sankey => format!("'{prefix}_' || event_type"),
                FlowMode::Sunburst => format!("'{prefix}_' || event_path"),
            }
        };

        let mut layer_ctes = vec!["starting_entities".to_string()];

        for depth in 1..=steps_before {
            let prev = layer_ctes.last().unwrap().clone();
            let name = format!("before_step_{depth}");
            let body = if use_lateral {
                format!(
                    "SELECT p.binding_key, l.{time_col} AS start_time, l.{event_col} AS event_type, p.event_path || '>' || l.{event_col} AS event_path \
                     FROM {prev} p CROSS JOIN LATERAL (SELECT * FROM {table} t WHERE t.{binding_col} = p.binding_key AND t.{time_col} < p.start_time ORDER BY t.{time_col} DESC LIMIT 1) l"
                )
            } else {
                format!(
                    "SELECT binding_key, start_time, event_type, event_path FROM ( \
                       SELECT p.binding_key AS binding_key, t.{time_col} AS start_time, t.{event_col} AS event_type, p.event_path || '>' || t.{event_col} AS event_path, \
                       ROW_NUMBER() OVER (PARTITION BY p.binding_key ORDER BY t.{time_col} DESC) AS rn \
                       FROM {prev} p JOIN {table} t ON t.{binding_col} = p.binding_key AND t.{time_col} < p.start_time \
                     ) ranked WHERE rn = 1"
                )
            };
            ctes.push(format!("{name} AS ({body})"));
            layer_ctes.push(name);
        }

        let mut forward_ctes = vec!["starting_entities".to_string()];
        for depth in 1..=steps_after {
            let prev = forward_ctes.last().unwrap().clone();
            let name = format!("after_step_{depth}");
            let body = if use_lateral {
                format!(
                    "SELECT p.binding_key, l.{time_col} AS start_time, l.{event_col} AS event_type, p.event_path || '>' || l.{event_col} AS event_path \
                     FROM {prev} p CROSS JOIN LATERAL (SELECT * FROM {table} t WHERE t.{binding_col} = p.binding_key AND t.{time_col} > p.start_time ORDER BY t.{time_col} ASC LIMIT 1) l"
                )
            } else {
                format!(
                    "SELECT binding_key, start_time, event_type, event_path FROM ( \
                       SELECT p.binding_key AS binding_key, t.{time_col} AS start_time, t.{event_col} AS event_type, p.event_path || '>' || t.{event_col} AS event_path, \
                       ROW_NUMBER() OVER (PARTITION BY p.binding_key ORDER BY t.{time_col} ASC) AS rn \
                       FROM {prev} p JOIN {table} t ON t.{binding_col} = p.binding_key AND t.{time_col} > p.start_time \
                     ) ranked WHERE rn = 1"
                )
            };
            ctes.push(format!("{name} AS ({body})"));
            forward_ctes.push(name);
        }

        let mut all_layers = layer_ctes.clone();
        all_layers.extend(forward_ctes.iter().skip(1).cloned());

        // Sankey nodes are keyed by event type alone, so the same event
        // occurring through different paths still merges into one node;
        // sunburst keeps the full path so each ring position stays distinct.
        let nodes_group_by = match mode {
            FlowMode::Sankey => "event_type",
            FlowMode::Sunburst => "event_type, event_path",
        };
        let node_expr = node_id_expr("n");
        let nodes_union: Vec<String> = all_layers
            .iter()
            .map(|cte| {
                format!(
                    "SELECT {node_expr} AS node_id, event_type AS name, '{cte}' AS layer, COUNT(*) AS value FROM {cte} GROUP BY {nodes_group_by}"
                )
            })
            .collect();
        ctes.push(format!("nodes_agg AS ({})", nodes_union.join(" UNION ALL ")));

        let mut link_layers = Vec::new();
        for w in layer_ctes.windows(2) {
            link_layers.push((w[0].clone(), w[1].clone()));
        }
        for w in forward_ctes.windows(2) {
            link_layers.push((w[0].clone(), w[1].clone()));
        }

        let links_group_by = match mode {
            FlowMode::Sankey => "a.event_type, b.event_type",
            FlowMode::Sunburst => "a.event_type, a.event_path, b.event_type, b.event_path",
        };
        let links_union: Vec<String> = link_layers
            .iter()
            .map(|(a, b)| {
                let a_node = node_id_expr("n").replace("event_type", "a.event_type").replace("event_path", "a.event_path");
                let b_node = node_id_expr("n").replace("event_type", "b.event_type").replace("event_path", "b.event_path");
                format!(
                    "SELECT {a_node} AS source, {b_node} AS target, COUNT(*) AS value FROM {a} a JOIN {b} b ON a.binding_key = b.binding_key GROUP BY {links_group_by}"
                )
            })
            .collect();
        if !links_union.is_empty() {
            ctes.push(format!("links_agg AS ({})", links_union.join(" UNION ALL ")));
        }

        let final_sql = if links_union.is_empty() {
            "SELECT 'node' AS record_type, node_id, name, layer, value, NULL AS source, NULL AS target FROM nodes_agg".to_string()
        } else {
            "SELECT 'node' AS record_type, node_id, name, layer, value, NULL AS source, NULL AS target FROM nodes_agg \
             UNION ALL \
             SELECT 'link' AS record_type, NULL AS node_id, NULL AS name, NULL AS layer, value, source, target FROM links_agg"
                .to_string()
        };

        Ok(format!("WITH {} {}", ctes.join(", "), final_sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::model::{Cube, Dimension, EventStreamMeta, FieldType};
    use crate::expr::SqlRef;
    use std::collections::BTreeMap;

    fn event_cube() -> Cube {
        let mut dimensions = BTreeMap::new();
        for name in ["user_id", "event_time", "event_type", "funnel_step"] {
            dimensions.insert(
                name.to_string(),
                Dimension {
                    name: name.to_string(),
                    title: None,
                    description: None,
                    sql: SqlRef::Column { column: name.to_string() },
                    field_type: FieldType::String,
                    primary_key: false,
                },
            );
        }
        Cube {
            name: "events".into(),
            title: None,
            description: None,
            example_questions: vec![],
            sql_table: "events".into(),
            base_where: None,
            dimensions,
            measures: BTreeMap::new(),
            joins: BTreeMap::new(),
            hierarchies: BTreeMap::new(),
            event_stream: Some(EventStreamMeta {
                binding_key: "user_id".into(),
                time_dimension: "event_time".into(),
                event_dimension: "event_type".into(),
            }),
        }
    }

    #[test]
    fn rejects_depth_out_of_range() {
        let mut registry = CubeRegistry::new();
        registry.register(event_cube()).unwrap();
        let dialect = PostgresDialect;
        let planner = FlowPlanner::new(&registry, &dialect);
        let config = FlowQueryConfig {
            event_stream: "events".into(),
            step_dimension: "funnel_step".into(),
            starting_step: Some(serde_json::json!("signup")),
            steps_before: 6,
            steps_after: 0,
            strategy: FlowStrategy::Auto,
        };
        let err = planner.plan(&config, false).unwrap_err();
        assert_eq!(err.kind(), "flow/depth-out-of-range");
    }

    #[test]
    fn rejects_missing_starting_step() {
        let mut registry = CubeRegistry::new();
        registry.register(event_cube()).unwrap();
        let dialect = PostgresDialect;
        let planner = FlowPlanner::new(&registry, &dialect);
        let config = FlowQueryConfig {
            event_stream: "events".into(),
            step_dimension: "funnel_step".into(),
            starting_step: None,
            steps_before: 2,
            steps_after: 0,
            strategy: FlowStrategy::Auto,
        };
        let err = planner.plan(&config, false).unwrap_err();
        assert_eq!(err.kind(), "flow/missing-starting-step");
    }

    #[test]
    fn high_depth_emits_a_warning() {
        let mut registry = CubeRegistry::new();
        registry.register(event_cube()).unwrap();
        let dialect = PostgresDialect;
        let planner = FlowPlanner::new(&registry, &dialect);
        let config = FlowQueryConfig {
            event_stream: "events".into(),
            step_dimension: "funnel_step".into(),
            starting_step: Some(serde_json::json!("signup")),
            steps_before: 4,
            steps_after: 0,
            strategy: FlowStrategy::Auto,
        };
        let (_, _, warnings) = planner.plan(&config, false).unwrap();
        assert!(matches!(warnings[0], QueryWarning::HighFlowDepth { depth: 4 }));
    }

    #[test]
    fn sankey_mode_merges_nodes_by_event_type_alone() {
        let mut registry = CubeRegistry::new();
        registry.register(event_cube()).unwrap();
        let dialect = PostgresDialect;
        let planner = FlowPlanner::new(&registry, &dialect);
        let config = FlowQueryConfig {
            event_stream: "events".into(),
            step_dimension: "funnel_step".into(),
            starting_step: Some(serde_json::json!("signup")),
            steps_before: 2,
            steps_after: 0,
            strategy: FlowStrategy::Auto,
        };
        let (sql, _, _) = planner.plan(&config, false).unwrap();
        assert!(sql.contains("GROUP BY event_type"));
        assert!(!sql.contains("GROUP BY event_type, event_path"));
    }

    #[test]
    fn sunburst_mode_keeps_full_path_grouping() {
        let mut registry = CubeRegistry::new();
        registry.register(event_cube()).unwrap();
        let dialect = PostgresDialect;
        let planner = FlowPlanner::new(&registry, &dialect);
        let config = FlowQueryConfig {
            event_stream: "events".into(),
            step_dimension: "funnel_step".into(),
            starting_step: Some(serde_json::json!("signup")),
            steps_before: 2,
            steps_after: 0,
            strategy: FlowStrategy::Auto,
        };
        let (sql, _, _) = planner.plan(&config, true).unwrap();
        assert!(sql.contains("GROUP BY event_type, event_path"));
    }
}
