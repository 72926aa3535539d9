//! Integration tests for `CubeRegistry` loading and metadata introspection.

mod support;

use semaqore::model::Relationship;

#[test]
fn metadata_reports_dimensions_measures_and_relationships() {
    let registry = support::orders_customers_registry();
    let descriptors = registry.metadata();

    let orders = descriptors.iter().find(|c| c.name == "orders").expect("orders cube present");
    assert_eq!(orders.title.as_deref(), Some("Orders"));
    assert!(orders.dimensions.iter().any(|d| d.name == "status"));
    assert!(orders.measures.iter().any(|m| m.name == "revenue"));
    assert_eq!(orders.relationships.len(), 1);
    assert_eq!(orders.relationships[0].target_cube, "customers");
    assert_eq!(orders.relationships[0].relationship, Relationship::BelongsTo);

    let customers = descriptors.iter().find(|c| c.name == "customers").expect("customers cube present");
    assert!(customers.relationships.is_empty());
}

#[test]
fn require_surfaces_unknown_field_error_for_missing_cube() {
    let registry = support::orders_customers_registry();
    let err = registry.require("shipments").unwrap_err();
    assert_eq!(err.kind(), "query/unknown-field");
}

#[test]
fn joins_from_lists_outbound_relationships_only() {
    let registry = support::orders_customers_registry();
    let orders_joins: Vec<_> = registry.joins_from("orders").collect();
    assert_eq!(orders_joins.len(), 1);
    assert_eq!(orders_joins[0].0, "customer");

    let customers_joins: Vec<_> = registry.joins_from("customers").collect();
    assert!(customers_joins.is_empty());
}

#[test]
fn loading_cube_yaml_from_a_directory_round_trips_through_the_registry() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: products
sql_table: products
dimensions:
  id:
    sql: id
    type: string
  name:
    sql: name
    type: string
measures:
  count:
    sql: id
    agg: count
"#;
    let mut file = std::fs::File::create(dir.path().join("products.yml")).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let mut registry = semaqore::registry::CubeRegistry::new();
    registry.load_from_dir(dir.path()).unwrap();
    registry.validate_joins().unwrap();

    let products = registry.require("products").unwrap();
    assert_eq!(products.dimensions["name"].name, "name");
    assert_eq!(products.measures["count"].name, "count");
}

#[test]
fn measure_filters_declared_in_yaml_survive_loading() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: orders
sql_table: orders
dimensions:
  status:
    sql: status
    type: string
measures:
  paidCount:
    sql: id
    agg: count
    filters:
      - member: orders.status
        operator: equals
        values: ["paid"]
"#;
    let mut file = std::fs::File::create(dir.path().join("orders.yml")).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let mut registry = semaqore::registry::CubeRegistry::new();
    registry.load_from_dir(dir.path()).unwrap();
    registry.validate_joins().unwrap();

    let orders = registry.require("orders").unwrap();
    let measure = &orders.measures["paidCount"];
    assert_eq!(measure.filters.len(), 1);
    match &measure.filters[0] {
        semaqore::query::FilterCondition::Leaf(leaf) => {
            assert_eq!(leaf.member, "orders.status");
            assert_eq!(leaf.values, vec![serde_json::json!("paid")]);
        }
        other => panic!("expected a leaf filter, got {other:?}"),
    }
}
