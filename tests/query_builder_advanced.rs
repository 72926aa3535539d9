//! Integration tests for the security-context, comparison-period, window,
//! calculated-measure, and backward-join-path behaviors of `query_builder::compile`.

mod support;

use std::collections::BTreeMap;

use semaqore::datetime::DateRangeSpec;
use semaqore::dialect::{DuckDbDialect, PostgresDialect};
use semaqore::model::SortDirection;
use semaqore::query::{OrderItem, QueryContext, SecurityContext, SemanticQuery, TimeDimensionRequest};

fn ctx(security: SecurityContext) -> QueryContext {
    QueryContext::new(security)
}

fn base_query() -> SemanticQuery {
    SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.count".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    }
}

fn security_with(key: &str, value: serde_json::Value) -> SecurityContext {
    let mut values = BTreeMap::new();
    values.insert(key.to_string(), value);
    SecurityContext { values }
}

#[test]
fn different_security_contexts_compile_to_different_params() {
    let registry = support::tenant_scoped_orders_registry();
    let dialect = DuckDbDialect;
    let query = base_query();

    let (sql_a, params_a, _) =
        semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(security_with("tenant_id", serde_json::json!("acme")))).unwrap();
    let (sql_b, params_b, _) =
        semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(security_with("tenant_id", serde_json::json!("globex")))).unwrap();

    assert_eq!(sql_a, sql_b, "the SQL text is identical — only the bound parameter differs");
    assert_ne!(params_a, params_b);
    assert!(params_a.contains(&serde_json::json!("acme")));
    assert!(params_b.contains(&serde_json::json!("globex")));
}

#[test]
fn missing_security_context_key_is_rejected() {
    let registry = support::tenant_scoped_orders_registry();
    let dialect = DuckDbDialect;
    let query = base_query();

    let err = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap_err();
    assert_eq!(err.kind(), "query/security-context-missing");
}

#[test]
fn compare_to_prior_period_unions_current_and_prior_branches() {
    let registry = support::orders_customers_registry();
    let dialect = PostgresDialect;
    let query = SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.count".to_string()],
        filters: vec![],
        time_dimensions: vec![TimeDimensionRequest {
            dimension: "orders.id".to_string(),
            granularity: None,
            date_range: Some(DateRangeSpec::Absolute { start: "2026-01-01".to_string(), end: "2026-01-31".to_string() }),
            compare_to_prior_period: true,
        }],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap();
    assert!(sql.contains("UNION ALL"));
    assert!(sql.contains("__period"));
    assert!(sql.matches("SELECT").count() >= 2);
    // current-period bounds then prior-period bounds, in that order.
    assert!(params.len() >= 4);
}

#[test]
fn window_measure_projects_its_source_measure_in_the_inner_stage() {
    let registry = support::orders_with_calc_and_window_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.day".to_string()],
        measures: vec!["orders.runningRevenue".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, _params, planned) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap();
    assert!(sql.contains("orders__revenue"), "source measure must be projected in the inner aggregation: {sql}");
    assert!(sql.contains("OVER"));
    assert_eq!(planned.numeric_fields, vec!["orders__runningRevenue".to_string()]);
}

#[test]
fn moving_avg_with_frame_renders_a_bounded_rows_window() {
    let registry = support::orders_with_calc_and_window_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.day".to_string()],
        measures: vec!["orders.movingAvg7".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, _params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap();
    assert!(sql.contains("ROWS BETWEEN 6 PRECEDING AND CURRENT ROW"), "expected a bounded frame clause: {sql}");
}

#[test]
fn calculated_measure_referencing_another_calculated_measure_resolves() {
    let registry = support::orders_with_calc_and_window_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.margin".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, _params, planned) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap();
    assert!(sql.contains("orders__revenue"));
    assert!(sql.contains("orders__count"));
    assert_eq!(planned.numeric_fields, vec!["orders__margin".to_string()]);
}

#[test]
fn sibling_calc_measures_sharing_a_dependency_are_not_treated_as_a_cycle() {
    let registry = support::orders_with_calc_and_window_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.margin".to_string(), "orders.avgOrderValue".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };
    let result = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default()));
    assert!(result.is_ok(), "a shared non-cyclic dependency must not be rejected");
}

#[test]
fn mutually_referencing_calculated_measures_are_rejected_as_a_cycle() {
    let registry = support::orders_with_cyclic_calc_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.a".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };
    let err = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap_err();
    assert_eq!(err.kind(), "query/calc-cycle");
}

#[test]
fn base_cube_without_any_declared_joins_still_reaches_a_cube_that_joins_against_it() {
    let registry = support::orders_customers_registry();
    let dialect = DuckDbDialect;
    // "customers" declares no joins at all; only "orders" declares
    // `orders -> customers`. Basing the query on "customers" requires
    // walking that join backward.
    let query = SemanticQuery {
        dimensions: vec!["customers.country".to_string(), "orders.status".to_string()],
        measures: vec![],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![OrderItem { field: "customers.country".to_string(), direction: SortDirection::Asc }],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, _params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx(SecurityContext::default())).unwrap();
    assert!(sql.contains("JOIN"));
    assert!(sql.contains("customers__country"));
    assert!(sql.contains("orders__status"));
}
