//! The compiled SQL intermediate representation and its renderer.
//!
//! Grounded on the teacher's `sql_ast::{SqlExpr, SelectQuery, SqlRenderer}`,
//! with one load-bearing change: `SqlExpr::Literal` is never inlined into SQL
//! text. `SqlRenderer::render_select` returns `(String, Vec<Value>)` — every
//! literal encountered while walking the tree is pushed onto the parameter
//! list and replaced with `Dialect::placeholder(idx)` at its position. This
//! is what keeps every user-supplied and security-context value a bound
//! parameter, never a string-concatenated fragment.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::model::{SimpleAgg, SortDirection, WindowKind, WindowOp};

#[derive(Debug, Clone)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    Function {
        func: crate::expr::SqlFunction,
        args: Vec<SqlExpr>,
    },
    Case {
        branches: Vec<(SqlExpr, SqlExpr)>,
        else_expr: Box<SqlExpr>,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Aggregate {
        agg: SimpleAgg,
        expr: Box<SqlExpr>,
        /// Row-level FILTER predicate, rendered via `FILTER (WHERE ...)` when
        /// the dialect supports it, else as an inline `CASE WHEN` inside the
        /// aggregate argument.
        filter: Option<Box<SqlExpr>>,
    },
    Window {
        kind: WindowKind,
        op: WindowOp,
        source: Box<SqlExpr>,
        order_by: Vec<OrderItem>,
        frame: Option<String>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    /// Already-safe SQL text with no embedded values (e.g. `TRUE`,
    /// `CURRENT_DATE`). Never constructed from request-supplied text.
    Raw(String),
}

#[derive(Debug, Clone, Copy)]
pub enum SqlBinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    /// When set, this "table" is itself a nested `SelectQuery`; `name` is
    /// ignored. Rendered recursively through the *same* parameter sink as the
    /// outer query, so placeholder indices stay correct across the nesting —
    /// splicing in a separately-rendered SQL string would desynchronize
    /// positional placeholders ($1, $2, ...) between the two levels.
    pub subquery: Option<Box<SelectQuery>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: SqlJoinType,
    pub table: TableRef,
    pub lateral: bool,
    pub on: Vec<SqlExpr>,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    pub having: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Additional branches `UNION ALL`-ed after this one (e.g. a prior-period
    /// comparison branch), sharing this query's parameter sink so placeholder
    /// numbering stays sequential across all of them. Only the primary
    /// branch's `order_by`/`limit`/`offset` apply to the combined statement.
    pub union_all: Vec<SelectQuery>,
}

/// Accumulates literals encountered while rendering, in positional order.
struct ParamSink {
    params: Vec<Value>,
}

impl ParamSink {
    fn push(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len() - 1
    }
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Render a `SelectQuery` into SQL text and its positional bound
    /// parameters. The returned SQL contains a placeholder at every position
    /// a literal occurred; it never contains a stringified value.
    pub fn render_select(&self, query: &SelectQuery) -> (String, Vec<Value>) {
        let mut sink = ParamSink { params: Vec::new() };
        let sql = self.render_select_inner(query, &mut sink);
        (sql, sink.params)
    }

    fn render_select_inner(&self, query: &SelectQuery, sink: &mut ParamSink) -> String {
        let mut sql = self.render_branch(query, sink);
        for branch in &query.union_all {
            sql.push_str(" UNION ALL ");
            sql.push_str(&self.render_branch(branch, sink));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let expr = self.render_expr(&o.expr, sink);
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{expr} {dir}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    /// Renders one `SELECT ... HAVING` branch, excluding `ORDER BY`/`LIMIT`/
    /// `OFFSET` — those apply once, to the combined statement, not per branch.
    fn render_branch(&self, query: &SelectQuery, sink: &mut ParamSink) -> String {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr, sink);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_items.join(", "),
            self.render_table_ref(&query.from, sink)
        );

        for join in &query.joins {
            let join_kw = match join.join_type {
                SqlJoinType::Inner => "JOIN",
                SqlJoinType::Left => "LEFT JOIN",
                SqlJoinType::Right => "RIGHT JOIN",
                SqlJoinType::Full => "FULL JOIN",
            };
            let lateral_kw = if join.lateral { "LATERAL " } else { "" };
            let on_clause: Vec<String> = join.on.iter().map(|e| self.render_expr(e, sink)).collect();
            sql.push_str(&format!(
                " {join_kw} {lateral_kw}{} ON {}",
                self.render_table_ref(&join.table, sink),
                if on_clause.is_empty() { "TRUE".to_string() } else { on_clause.join(" AND ") }
            ));
        }

        if !query.filters.is_empty() {
            let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f, sink)).collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g, sink)).collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !query.having.is_empty() {
            let having: Vec<String> = query.having.iter().map(|h| self.render_expr(h, sink)).collect();
            sql.push_str(&format!(" HAVING {}", having.join(" AND ")));
        }

        sql
    }

    fn render_table_ref(&self, table: &TableRef, sink: &mut ParamSink) -> String {
        if let Some(subquery) = &table.subquery {
            let inner_sql = self.render_select_inner(subquery, sink);
            return match &table.alias {
                Some(alias) => format!("({inner_sql}) {}", self.dialect.quote_ident(alias)),
                None => format!("({inner_sql})"),
            };
        }
        match &table.alias {
            Some(alias) => format!("{} {}", self.dialect.qualify_table(&table.name), self.dialect.quote_ident(alias)),
            None => self.dialect.qualify_table(&table.name),
        }
    }

    fn render_expr(&self, expr: &SqlExpr, sink: &mut ParamSink) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", self.dialect.quote_ident(t), self.dialect.quote_ident(name)),
                None => self.dialect.quote_ident(name),
            },
            SqlExpr::Literal(v) => {
                let idx = sink.push(v.clone());
                self.dialect.placeholder(idx)
            }
            SqlExpr::Raw(text) => text.clone(),
            SqlExpr::Function { func, args } => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_expr(a, sink)).collect();
                self.dialect.render_function(func, rendered_args)
            }
            SqlExpr::Case { branches, else_expr } => {
                let mut parts = vec!["CASE".to_string()];
                for (when, then) in branches {
                    parts.push(format!(" WHEN {} THEN {}", self.render_expr(when, sink), self.render_expr(then, sink)));
                }
                parts.push(format!(" ELSE {} END", self.render_expr(else_expr, sink)));
                parts.join("")
            }
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::Add => "+",
                    SqlBinaryOperator::Subtract => "-",
                    SqlBinaryOperator::Multiply => "*",
                    SqlBinaryOperator::Divide => "/",
                    SqlBinaryOperator::Modulo => "%",
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Or => "OR",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                    SqlBinaryOperator::ILike => "ILIKE",
                };
                format!("({} {op_sql} {})", self.render_expr(left, sink), self.render_expr(right, sink))
            }
            SqlExpr::Aggregate { agg, expr, filter } => {
                let inner = self.render_expr(expr, sink);
                match filter {
                    None => self.dialect.render_aggregation(agg, &inner),
                    Some(pred) if self.dialect.supports_filtered_aggregates() => {
                        let pred_sql = self.render_expr(pred, sink);
                        format!("{} FILTER (WHERE {pred_sql})", self.dialect.render_aggregation(agg, &inner))
                    }
                    Some(pred) => {
                        let pred_sql = self.render_expr(pred, sink);
                        let cased = format!("CASE WHEN {pred_sql} THEN {inner} ELSE NULL END");
                        self.dialect.render_aggregation(agg, &cased)
                    }
                }
            }
            SqlExpr::Window { kind, op, source, order_by, frame } => {
                let source_sql = self.render_expr(source, sink);
                let order_sql = if order_by.is_empty() {
                    String::new()
                } else {
                    let items: Vec<String> = order_by
                        .iter()
                        .map(|o| {
                            let dir = match o.direction {
                                SortDirection::Asc => "ASC",
                                SortDirection::Desc => "DESC",
                            };
                            format!("{} {dir}", self.render_expr(&o.expr, sink))
                        })
                        .collect();
                    format!("ORDER BY {}", items.join(", "))
                };
                let frame_sql = frame.clone().unwrap_or_default();
                self.dialect.render_window(kind, op, &source_sql, &order_sql, &frame_sql)
            }
            SqlExpr::InList { expr, list, negated } => {
                let rendered_values: Vec<String> = list.iter().map(|v| self.render_expr(v, sink)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{} {not_kw}IN ({})", self.render_expr(expr, sink), rendered_values.join(", "))
            }
        }
    }
}
