//! Narrow checks on `SqlRenderer` clause assembly: a query with no filters,
//! no grouping, and no ordering renders none of those clauses.

use semaqore::dialect::DuckDbDialect;
use semaqore::model::SimpleAgg;
use semaqore::sql_ast::{SelectItem, SelectQuery, SqlExpr, SqlRenderer, TableRef};

fn col(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column { table: Some(table.to_string()), name: name.to_string() }
}

#[test]
fn bare_select_omits_where_group_by_and_order_by() {
    let dialect = DuckDbDialect;
    let renderer = SqlRenderer::new(&dialect);
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: SqlExpr::Aggregate { agg: SimpleAgg::Count, expr: Box::new(col("orders", "id")), filter: None },
            alias: Some("orders__count".to_string()),
        }],
        from: TableRef { name: "orders".to_string(), alias: None, subquery: None },
        joins: vec![],
        filters: vec![],
        having: vec![],
        group_by: vec![],
        order_by: vec![],
        limit: None,
        offset: None,
        union_all: vec![],
    };

    let (sql, params) = renderer.render_select(&query);
    assert!(params.is_empty());
    assert!(!sql.contains("WHERE"));
    assert!(!sql.contains("GROUP BY"));
    assert!(!sql.contains("ORDER BY"));
    assert!(!sql.contains("LIMIT"));
    assert!(sql.contains("orders__count"));
}

#[test]
fn limit_without_offset_omits_offset_clause() {
    let dialect = DuckDbDialect;
    let renderer = SqlRenderer::new(&dialect);
    let query = SelectQuery {
        select: vec![SelectItem { expr: col("orders", "id"), alias: None }],
        from: TableRef { name: "orders".to_string(), alias: None, subquery: None },
        joins: vec![],
        filters: vec![],
        having: vec![],
        group_by: vec![],
        order_by: vec![],
        limit: Some(5),
        offset: None,
        union_all: vec![],
    };

    let (sql, _params) = renderer.render_select(&query);
    assert!(sql.contains("LIMIT 5"));
    assert!(!sql.contains("OFFSET"));
}
