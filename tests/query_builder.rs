//! Integration tests for `query_builder::compile`: end-to-end from a
//! `SemanticQuery` through the planner and renderer to SQL text + params.

mod support;

use semaqore::dialect::DuckDbDialect;
use semaqore::model::SortDirection;
use semaqore::query::{
    FilterCondition, FilterOp, LeafFilter, OrderItem, QueryContext, SecurityContext, SemanticQuery,
};

fn ctx() -> QueryContext {
    QueryContext::new(SecurityContext::default())
}

#[test]
fn compiles_a_single_cube_grouped_aggregate() {
    let registry = support::orders_customers_registry();
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

    let (sql, params, planned) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();

    assert!(sql.contains("GROUP BY"));
    assert!(sql.contains("orders__status"));
    assert!(sql.contains("orders__count"));
    assert!(params.is_empty());
    assert_eq!(planned.numeric_fields, vec!["orders__count".to_string()]);
}

#[test]
fn filter_values_never_appear_as_inline_sql_text() {
    let registry = support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.status".to_string()],
        measures: vec!["orders.count".to_string()],
        filters: vec![FilterCondition::Leaf(LeafFilter {
            member: "orders.status".to_string(),
            operator: FilterOp::Equals,
            values: vec![serde_json::json!("paid")],
        })],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();
    assert!(!sql.contains("'paid'"));
    assert_eq!(params, vec![serde_json::json!("paid")]);
}

#[test]
fn joining_a_dimension_from_a_related_cube_pulls_in_the_join() {
    let registry = support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["customers.country".to_string()],
        measures: vec!["orders.revenue".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![OrderItem { field: "customers.country".to_string(), direction: SortDirection::Asc }],
        limit: Some(20),
        offset: None,
        flow: None,
    };

    let (sql, _params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();
    assert!(sql.contains("JOIN"));
    assert!(sql.contains("customers__country"));
    assert!(sql.contains("ORDER BY"));
    assert!(sql.contains("LIMIT 20"));
    // orders -> customers is belongsTo, so it must join INNER (plain JOIN), not LEFT.
    assert!(!sql.contains("LEFT JOIN"), "belongsTo must not render as LEFT JOIN: {sql}");
}

#[test]
fn offset_without_limit_is_rejected() {
    let registry = support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.status".to_string()],
        measures: vec![],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: Some(10),
        flow: None,
    };

    let err = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap_err();
    assert_eq!(err.kind(), "query/offset-without-limit");
}

#[test]
fn unknown_field_reference_is_rejected() {
    let registry = support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.nonexistent".to_string()],
        measures: vec![],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let err = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap_err();
    assert_eq!(err.kind(), "query/unknown-field");
}
