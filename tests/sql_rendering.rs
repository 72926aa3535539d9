//! Integration tests for the `SqlRenderer`: every literal must come back as
//! a bound parameter and a dialect-specific placeholder, never inlined text.

use semaqore::dialect::{DuckDbDialect, PostgresDialect};
use semaqore::model::{SimpleAgg, SortDirection};
use semaqore::sql_ast::{
    Join, OrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, SqlJoinType, SqlRenderer, TableRef,
};

fn col(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column { table: Some(table.to_string()), name: name.to_string() }
}

fn simple_query() -> SelectQuery {
    SelectQuery {
        select: vec![
            SelectItem { expr: col("orders", "status"), alias: Some("orders__status".to_string()) },
            SelectItem {
                expr: SqlExpr::Aggregate { agg: SimpleAgg::Count, expr: Box::new(col("orders", "id")), filter: None },
                alias: Some("orders__count".to_string()),
            },
        ],
        from: TableRef { name: "orders".to_string(), alias: None, subquery: None },
        joins: vec![],
        filters: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(col("orders", "status")),
            right: Box::new(SqlExpr::Literal(serde_json::json!("paid"))),
        }],
        having: vec![],
        group_by: vec![col("orders", "status")],
        order_by: vec![OrderItem { expr: col("orders", "status"), direction: SortDirection::Asc }],
        limit: Some(10),
        offset: None,
        union_all: vec![],
    }
}

#[test]
fn literal_in_filter_becomes_a_bound_parameter_not_inline_text() {
    let dialect = DuckDbDialect;
    let renderer = SqlRenderer::new(&dialect);
    let (sql, params) = renderer.render_select(&simple_query());

    assert!(!sql.contains("'paid'"), "literal must never be inlined: {sql}");
    assert!(sql.contains("WHERE"));
    assert_eq!(params, vec![serde_json::json!("paid")]);
}

#[test]
fn postgres_placeholders_are_numbered_and_sequential() {
    let dialect = PostgresDialect;
    let renderer = SqlRenderer::new(&dialect);

    let mut query = simple_query();
    query.filters.push(SqlExpr::BinaryOp {
        op: SqlBinaryOperator::Gt,
        left: Box::new(col("orders", "amount")),
        right: Box::new(SqlExpr::Literal(serde_json::json!(100))),
    });
    let (sql, params) = renderer.render_select(&query);

    assert!(sql.contains('$'));
    assert!(sql.contains("$1"));
    assert!(sql.contains("$2"));
    assert_eq!(params.len(), 2);
}

#[test]
fn duckdb_placeholders_use_question_marks() {
    let dialect = DuckDbDialect;
    let renderer = SqlRenderer::new(&dialect);
    let (sql, _params) = renderer.render_select(&simple_query());
    assert!(sql.contains('?'));
    assert!(!sql.contains('$'));
}

#[test]
fn nested_subquery_shares_the_same_parameter_sink_as_the_outer_query() {
    let dialect = PostgresDialect;
    let renderer = SqlRenderer::new(&dialect);

    let inner = simple_query();
    let outer = SelectQuery {
        select: vec![SelectItem { expr: col("agg", "orders__status"), alias: None }],
        from: TableRef { name: String::new(), alias: Some("agg".to_string()), subquery: Some(Box::new(inner)) },
        joins: vec![Join {
            join_type: SqlJoinType::Inner,
            table: TableRef { name: "customers".to_string(), alias: None, subquery: None },
            lateral: false,
            on: vec![SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Eq,
                left: Box::new(col("agg", "orders__status")),
                right: Box::new(SqlExpr::Literal(serde_json::json!("active"))),
            }],
        }],
        filters: vec![],
        having: vec![],
        group_by: vec![],
        order_by: vec![],
        limit: None,
        offset: None,
        union_all: vec![],
    };

    let (sql, params) = renderer.render_select(&outer);
    // the inner literal ("paid") is placeholder $1, the outer join's literal
    // ("active") is placeholder $2 — positions stay correct across nesting.
    assert!(sql.contains("$1"));
    assert!(sql.contains("$2"));
    assert_eq!(params, vec![serde_json::json!("paid"), serde_json::json!("active")]);
}

#[test]
fn union_all_branches_render_in_order_with_sequential_placeholders() {
    let dialect = PostgresDialect;
    let renderer = SqlRenderer::new(&dialect);

    let mut primary = simple_query();
    let mut prior = simple_query();
    prior.filters = vec![SqlExpr::BinaryOp {
        op: SqlBinaryOperator::Eq,
        left: Box::new(col("orders", "status")),
        right: Box::new(SqlExpr::Literal(serde_json::json!("refunded"))),
    }];
    primary.union_all.push(prior);

    let (sql, params) = renderer.render_select(&primary);
    let union_pos = sql.find(" UNION ALL ").expect("expected a UNION ALL clause");
    assert_eq!(sql.matches("SELECT").count(), 2);
    // only the primary branch's ORDER BY/LIMIT apply, and they apply once,
    // after both branches.
    assert!(sql.rfind("ORDER BY").unwrap() > union_pos);
    assert_eq!(sql.matches("LIMIT").count(), 1);
    assert_eq!(params, vec![serde_json::json!("paid"), serde_json::json!("refunded")]);
}
