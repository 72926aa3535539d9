//! Shared fixtures for integration tests: a small two-cube registry
//! (orders belonging to customers) exercised across registry, query
//! builder, and SQL rendering tests.

use std::collections::BTreeMap;

use semaqore::expr::SqlRef;
use semaqore::expr_parser::CalcAst;
use semaqore::model::{
    Cube, Dimension, FieldType, Join, JoinKeyPair, Measure, MeasureKind, OrderKey, Relationship, SimpleAgg,
    SortDirection, WindowFrame, WindowKind, WindowOp, WindowSpec,
};
use semaqore::registry::CubeRegistry;

fn dimension(column: &str, field_type: FieldType) -> Dimension {
    Dimension {
        name: String::new(),
        title: None,
        description: None,
        sql: SqlRef::Column { column: column.to_string() },
        field_type,
        primary_key: false,
    }
}

fn simple_measure(column: &str, agg: SimpleAgg) -> Measure {
    Measure {
        name: String::new(),
        title: None,
        description: None,
        format: None,
        kind: MeasureKind::Simple { sql: SqlRef::Column { column: column.to_string() }, agg },
        filters: Vec::new(),
        drill_members: Vec::new(),
    }
}

pub fn orders_customers_registry() -> CubeRegistry {
    let mut customers_dims = BTreeMap::new();
    customers_dims.insert("id".to_string(), dimension("id", FieldType::String));
    customers_dims.insert("country".to_string(), dimension("country", FieldType::String));

    let customers = Cube {
        name: "customers".to_string(),
        title: Some("Customers".to_string()),
        description: None,
        example_questions: vec![],
        sql_table: "customers".to_string(),
        base_where: None,
        dimensions: customers_dims,
        measures: BTreeMap::new(),
        joins: BTreeMap::new(),
        hierarchies: BTreeMap::new(),
        event_stream: None,
    };

    let mut orders_dims = BTreeMap::new();
    orders_dims.insert("id".to_string(), dimension("id", FieldType::String));
    orders_dims.insert("status".to_string(), dimension("status", FieldType::String));
    orders_dims.insert("customer_id".to_string(), dimension("customer_id", FieldType::String));

    let mut orders_measures = BTreeMap::new();
    orders_measures.insert("count".to_string(), simple_measure("id", SimpleAgg::Count));
    orders_measures.insert("revenue".to_string(), simple_measure("amount", SimpleAgg::Sum));

    let mut orders_joins = BTreeMap::new();
    orders_joins.insert(
        "customer".to_string(),
        Join {
            target_cube: "customers".to_string(),
            relationship: Relationship::BelongsTo,
            on: vec![JoinKeyPair { source_column: "customer_id".to_string(), target_column: "id".to_string() }],
            preferred_for: vec![],
        },
    );

    let orders = Cube {
        name: "orders".to_string(),
        title: Some("Orders".to_string()),
        description: None,
        example_questions: vec![],
        sql_table: "orders".to_string(),
        base_where: None,
        dimensions: orders_dims,
        measures: orders_measures,
        joins: orders_joins,
        hierarchies: BTreeMap::new(),
        event_stream: None,
    };

    let mut registry = CubeRegistry::new();
    registry.register(customers).unwrap();
    registry.register(orders).unwrap();
    registry.validate_joins().unwrap();
    registry
}

/// A single `orders` cube whose `base_where` pins rows to the caller's
/// `tenant_id` security context entry — used to prove two different
/// `SecurityContext` values compile to different SQL/params.
pub fn tenant_scoped_orders_registry() -> CubeRegistry {
    let mut dims = BTreeMap::new();
    dims.insert("id".to_string(), dimension("id", FieldType::String));
    dims.insert("status".to_string(), dimension("status", FieldType::String));

    let mut measures = BTreeMap::new();
    measures.insert("count".to_string(), simple_measure("id", SimpleAgg::Count));

    let orders = Cube {
        name: "orders".to_string(),
        title: None,
        description: None,
        example_questions: vec![],
        sql_table: "orders".to_string(),
        base_where: Some(SqlRef::Binary {
            op: semaqore::expr::SqlRefOp::Eq,
            left: Box::new(SqlRef::Column { column: "tenant_id".to_string() }),
            right: Box::new(SqlRef::SecurityContext { key: "tenant_id".to_string() }),
        }),
        dimensions: dims,
        measures,
        joins: BTreeMap::new(),
        hierarchies: BTreeMap::new(),
        event_stream: None,
    };

    let mut registry = CubeRegistry::new();
    registry.register(orders).unwrap();
    registry.validate_joins().unwrap();
    registry
}

/// A single `orders` cube whose two calculated measures, `a` and `b`, refer
/// to each other — used to prove the planner rejects a calc-reference cycle
/// instead of recursing forever or silently mis-resolving.
pub fn orders_with_cyclic_calc_registry() -> CubeRegistry {
    let mut dims = BTreeMap::new();
    dims.insert("id".to_string(), dimension("id", FieldType::String));

    let mut measures = BTreeMap::new();
    measures.insert(
        "a".to_string(),
        Measure {
            name: "a".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Calculated {
                template: "b + 1".to_string(),
                ast: CalcAst::Binary {
                    op: semaqore::expr_parser::CalcOp::Add,
                    left: Box::new(CalcAst::MeasureRef { name: "b".to_string() }),
                    right: Box::new(CalcAst::Literal { value: serde_json::json!(1) }),
                },
            },
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );
    measures.insert(
        "b".to_string(),
        Measure {
            name: "b".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Calculated {
                template: "a + 1".to_string(),
                ast: CalcAst::Binary {
                    op: semaqore::expr_parser::CalcOp::Add,
                    left: Box::new(CalcAst::MeasureRef { name: "a".to_string() }),
                    right: Box::new(CalcAst::Literal { value: serde_json::json!(1) }),
                },
            },
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );

    let orders = Cube {
        name: "orders".to_string(),
        title: None,
        description: None,
        example_questions: vec![],
        sql_table: "orders".to_string(),
        base_where: None,
        dimensions: dims,
        measures,
        joins: BTreeMap::new(),
        hierarchies: BTreeMap::new(),
        event_stream: None,
    };

    let mut registry = CubeRegistry::new();
    registry.register(orders).unwrap();
    registry.validate_joins().unwrap();
    registry
}

/// A single `orders` cube with a `revenue`/`count` simple pair, an
/// `avgOrderValue` calculated measure referencing both, a `margin`
/// calculated measure referencing `avgOrderValue` (calc-referencing-calc),
/// and a `runningRevenue` window measure over `revenue` ordered by `day`.
pub fn orders_with_calc_and_window_registry() -> CubeRegistry {
    let mut dims = BTreeMap::new();
    dims.insert("id".to_string(), dimension("id", FieldType::String));
    dims.insert("day".to_string(), dimension("day", FieldType::String));

    let mut measures = BTreeMap::new();
    measures.insert("count".to_string(), simple_measure("id", SimpleAgg::Count));
    measures.insert("revenue".to_string(), simple_measure("amount", SimpleAgg::Sum));
    measures.insert(
        "avgOrderValue".to_string(),
        Measure {
            name: "avgOrderValue".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Calculated {
                template: "revenue / count".to_string(),
                ast: CalcAst::Binary {
                    op: semaqore::expr_parser::CalcOp::Divide,
                    left: Box::new(CalcAst::MeasureRef { name: "revenue".to_string() }),
                    right: Box::new(CalcAst::MeasureRef { name: "count".to_string() }),
                },
            },
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );
    measures.insert(
        "margin".to_string(),
        Measure {
            name: "margin".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Calculated {
                template: "avgOrderValue * 0.2".to_string(),
                ast: CalcAst::Binary {
                    op: semaqore::expr_parser::CalcOp::Multiply,
                    left: Box::new(CalcAst::MeasureRef { name: "avgOrderValue".to_string() }),
                    right: Box::new(CalcAst::Literal { value: serde_json::json!(0.2) }),
                },
            },
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );
    measures.insert(
        "runningRevenue".to_string(),
        Measure {
            name: "runningRevenue".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Window(WindowSpec {
                kind: WindowKind::RunningTotal,
                source_measure: "revenue".to_string(),
                op: WindowOp::Raw,
                order_by: vec![OrderKey { field: "orders.day".to_string(), direction: SortDirection::Asc }],
                frame: None,
            }),
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );
    measures.insert(
        "movingAvg7".to_string(),
        Measure {
            name: "movingAvg7".to_string(),
            title: None,
            description: None,
            format: None,
            kind: MeasureKind::Window(WindowSpec {
                kind: WindowKind::MovingAvg,
                source_measure: "revenue".to_string(),
                op: WindowOp::Raw,
                order_by: vec![OrderKey { field: "orders.day".to_string(), direction: SortDirection::Asc }],
                frame: Some(WindowFrame {
                    start: semaqore::model::FrameBound::Preceding(6),
                    end: semaqore::model::FrameBound::Current,
                }),
            }),
            filters: Vec::new(),
            drill_members: Vec::new(),
        },
    );

    let orders = Cube {
        name: "orders".to_string(),
        title: None,
        description: None,
        example_questions: vec![],
        sql_table: "orders".to_string(),
        base_where: None,
        dimensions: dims,
        measures,
        joins: BTreeMap::new(),
        hierarchies: BTreeMap::new(),
        event_stream: None,
    };

    let mut registry = CubeRegistry::new();
    registry.register(orders).unwrap();
    registry.validate_joins().unwrap();
    registry
}
