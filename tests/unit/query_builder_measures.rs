//! Narrow checks on measure projection: every requested measure becomes a
//! numeric output field, and multi-value equality filters compile to `IN`.

use semaqore::dialect::DuckDbDialect;
use semaqore::query::{FilterCondition, FilterOp, LeafFilter, QueryContext, SecurityContext, SemanticQuery};

fn ctx() -> QueryContext {
    QueryContext::new(SecurityContext::default())
}

#[test]
fn every_requested_measure_is_reported_as_a_numeric_field() {
    let registry = crate::support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec![],
        measures: vec!["orders.count".to_string(), "orders.revenue".to_string()],
        filters: vec![],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (_sql, _params, planned) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();
    assert_eq!(planned.numeric_fields, vec!["orders__count".to_string(), "orders__revenue".to_string()]);
}

#[test]
fn multi_value_equality_filter_compiles_to_in_list() {
    let registry = crate::support::orders_customers_registry();
    let dialect = DuckDbDialect;
    let query = SemanticQuery {
        dimensions: vec!["orders.status".to_string()],
        measures: vec!["orders.count".to_string()],
        filters: vec![FilterCondition::Leaf(LeafFilter {
            member: "orders.status".to_string(),
            operator: FilterOp::Equals,
            values: vec![serde_json::json!("paid"), serde_json::json!("refunded")],
        })],
        time_dimensions: vec![],
        order: vec![],
        limit: None,
        offset: None,
        flow: None,
    };

    let (sql, params, _) = semaqore::query_builder::compile(&registry, &dialect, &query, &ctx()).unwrap();
    assert!(sql.contains(" IN "), "multi-value equality should render as IN: {sql}");
    assert_eq!(params, vec![serde_json::json!("paid"), serde_json::json!("refunded")]);
}
