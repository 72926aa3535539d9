//! A query that only references the base cube's own fields should never
//! pull in a join, even when the registry has one available.

use semaqore::dialect::DuckDbDialect;
use semaqore::query::{QueryContext, SecurityContext, SemanticQuery};

fn ctx() -> QueryContext {
    QueryContext::new(SecurityContext::default())
}

#[test]
fn query_against_a_single_cube_emits_no_join() {
    let registry = crate::support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.status".to_string()],
        measures: vec!["orders.count".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, _params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();
    assert!(!sql.contains("JOIN"), "no cube other than the base was referenced: {sql}");
}

#[test]
fn plan_joins_returns_an_empty_plan_when_no_cube_is_required() {
    use semaqore::registry::CubeRegistry;
    use std::collections::BTreeSet;

    let registry: CubeRegistry = crate::support::orders_customers_registry();
    let plan = semaqore::join_planner::plan_joins(&registry, "orders", &BTreeSet::new()).unwrap();
    assert!(plan.joins.is_empty());
    assert!(plan.fan_out_cubes.is_empty());
}
