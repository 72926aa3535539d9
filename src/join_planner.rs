//! Graph construction over registered cubes, connectivity checking, and
//! join-path selection for a query's referenced cubes.
//!
//! Grounded on the teacher's `query_builder::joins::select_required_joins`
//! (required-alias reachability, ordered DFS emission), generalized from a
//! single flow's fixed join graph to the registry-wide graph of cube-to-cube
//! joins, with `preferredFor` as a tie-break when more than one shortest path
//! connects two cubes for a given measure/dimension pair.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::CoreError;
use crate::model::{Join, Relationship};
use crate::registry::CubeRegistry;
use crate::sql_ast::SqlJoinType;

#[derive(Debug, Clone)]
pub struct PlannedJoin {
    pub from_cube: String,
    pub to_cube: String,
    pub join: Join,
    pub sql_join_type: SqlJoinType,
}

#[derive(Debug, Clone, Default)]
pub struct JoinPlan {
    /// Joins in dependency order: each entry's `from_cube` is either the base
    /// cube or a cube already emitted earlier in this list.
    pub joins: Vec<PlannedJoin>,
    /// Cubes reachable through a `HasMany` edge — a measure on the base cube
    /// joined through one of these can silently inflate row counts (fan-out).
    pub fan_out_cubes: BTreeSet<String>,
}

/// `BelongsTo`/`HasOne` are row-preserving from the referencing side, so an
/// INNER JOIN is safe and keeps the planner from having to special-case NULLs
/// on the parent side. `HasMany` can multiply rows, so it joins LEFT instead
/// (to avoid dropping base rows with no matching children) and is reported in
/// `fan_out_cubes` so callers can warn when it's combined with an unguarded
/// aggregate.
fn sql_join_type_for(relationship: Relationship) -> SqlJoinType {
    match relationship {
        Relationship::BelongsTo | Relationship::HasOne => SqlJoinType::Inner,
        Relationship::HasMany => SqlJoinType::Left,
    }
}

/// Plan the joins needed to connect `base_cube` to every cube in
/// `required_cubes`. Returns `query/unconnected-cubes` if any required cube
/// has no join path from the base.
///
/// The join graph is undirected for traversal: a join declared on cube A
/// targeting cube B also lets BFS reach A from B. Each join's own declared
/// `relationship` still decides its SQL join type regardless of which
/// direction it was walked — the data model gives no rule for inverting
/// `belongsTo`/`hasMany` semantics on a backward-traversed edge, only for
/// correctly pairing `on` columns with whichever cube actually declared them
/// (handled by the caller via `PlannedJoin::join.target_cube`).
pub fn plan_joins(registry: &CubeRegistry, base_cube: &str, required_cubes: &BTreeSet<String>) -> Result<JoinPlan, CoreError> {
    let targets: BTreeSet<&str> = required_cubes.iter().map(|s| s.as_str()).filter(|c| *c != base_cube).collect();
    if targets.is_empty() {
        return Ok(JoinPlan::default());
    }

    // Index every join by the cube it targets, so a cube can discover joins
    // declared *about* it (backward edges) as well as joins it declares
    // itself (forward edges).
    let mut declared_against: HashMap<String, Vec<(String, String, Join)>> = HashMap::new();
    for cube in registry.cubes() {
        for (join_name, join) in cube.joins.iter() {
            declared_against
                .entry(join.target_cube.clone())
                .or_default()
                .push((cube.name.clone(), join_name.clone(), join.clone()));
        }
    }

    // BFS from base_cube over the undirected graph, recording the join used
    // to reach each cube and its predecessor, so we can rebuild the path once
    // all targets are found. The join is stored as declared (not rewritten),
    // so its `target_cube` still tells us which side originally declared it.
    let mut predecessor: HashMap<String, (String, Join)> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::from([base_cube.to_string()]);
    let mut queue: VecDeque<String> = VecDeque::from([base_cube.to_string()]);

    while let Some(current) = queue.pop_front() {
        let mut edges: Vec<(String, Join)> = registry
            .joins_from(&current)
            .map(|(_, j)| (j.target_cube.clone(), j.clone()))
            .collect();
        if let Some(back) = declared_against.get(&current) {
            edges.extend(back.iter().map(|(declarer, _, j)| (declarer.clone(), j.clone())));
        }
        // Tie-break: when multiple joins lead out of the same cube, prefer
        // ones whose `preferredFor` list is non-empty — a registered hint
        // that this is the canonical path for ambiguous multi-path graphs —
        // by visiting them first so BFS records them as the predecessor.
        edges.sort_by_key(|(_, j)| std::cmp::Reverse(j.preferred_for.len()));

        for (neighbor, join) in edges {
            if visited.contains(&neighbor) {
                continue;
            }
            visited.insert(neighbor.clone());
            predecessor.insert(neighbor.clone(), (current.clone(), join));
            queue.push_back(neighbor);
        }
    }

    let unreachable: Vec<String> = targets.iter().filter(|t| !visited.contains(**t)).map(|s| s.to_string()).collect();
    if !unreachable.is_empty() {
        return Err(CoreError::UnconnectedCubes(unreachable));
    }

    // Rebuild the path for every target and union the edges (a cube on the
    // path to one target may also be an ancestor of another).
    let mut path_cubes: BTreeSet<String> = BTreeSet::new();
    for target in &targets {
        let mut cursor = target.to_string();
        while cursor != base_cube {
            path_cubes.insert(cursor.clone());
            let (prev, _) = predecessor.get(&cursor).expect("reachable cube has a predecessor");
            cursor = prev.clone();
        }
    }

    // Emit joins in an order where every `from_cube` was already emitted (or
    // is the base), by repeatedly picking ready nodes — the graph is a tree
    // rooted at base_cube so this always terminates without cycles.
    let mut emitted: HashSet<String> = HashSet::from([base_cube.to_string()]);
    let mut joins = Vec::new();
    let mut remaining = path_cubes;
    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|cube| {
                let (prev, _) = &predecessor[*cube];
                emitted.contains(prev)
            })
            .cloned()
            .collect();
        for cube in &ready {
            let (prev, join) = &predecessor[cube];
            joins.push(PlannedJoin {
                from_cube: prev.clone(),
                to_cube: cube.clone(),
                sql_join_type: sql_join_type_for(join.relationship),
                join: join.clone(),
            });
            emitted.insert(cube.clone());
            remaining.remove(cube);
        }
    }

    let fan_out_cubes = joins
        .iter()
        .filter(|j| j.join.relationship == Relationship::HasMany)
        .map(|j| j.to_cube.clone())
        .collect();

    Ok(JoinPlan { joins, fan_out_cubes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cube, JoinKeyPair};
    use std::collections::BTreeMap;

    fn cube_with_join(name: &str, target: &str, relationship: Relationship) -> Cube {
        let mut joins = BTreeMap::new();
        joins.insert(
            format!("{name}_to_{target}"),
            Join {
                target_cube: target.to_string(),
                relationship,
                on: vec![JoinKeyPair { source_column: "id".into(), target_column: format!("{name}_id") }],
                preferred_for: vec![],
            },
        );
        Cube {
            name: name.to_string(),
            title: None,
            description: None,
            example_questions: vec![],
            sql_table: format!("{name}_table"),
            base_where: None,
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
            joins,
            hierarchies: BTreeMap::new(),
            event_stream: None,
        }
    }

    #[test]
    fn direct_join_is_found() {
        let mut registry = CubeRegistry::new();
        registry.register(cube_with_join("orders", "customers", Relationship::BelongsTo)).unwrap();
        registry
            .register(Cube {
                name: "customers".into(),
                title: None,
                description: None,
                example_questions: vec![],
                sql_table: "customers_table".into(),
                base_where: None,
                dimensions: BTreeMap::new(),
                measures: BTreeMap::new(),
                joins: BTreeMap::new(),
                hierarchies: BTreeMap::new(),
                event_stream: None,
            })
            .unwrap();

        let required = BTreeSet::from(["customers".to_string()]);
        let plan = plan_joins(&registry, "orders", &required).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].to_cube, "customers");
    }

    #[test]
    fn unreachable_cube_is_an_error() {
        let mut registry = CubeRegistry::new();
        registry.register(cube_with_join("orders", "customers", Relationship::BelongsTo)).unwrap();
        let required = BTreeSet::from(["ghosts".to_string()]);
        let err = plan_joins(&registry, "orders", &required).unwrap_err();
        assert_eq!(err.kind(), "query/unconnected-cubes");
    }

    #[test]
    fn has_many_join_is_flagged_as_fan_out() {
        let mut registry = CubeRegistry::new();
        registry.register(cube_with_join("customers", "orders", Relationship::HasMany)).unwrap();
        registry
            .register(Cube {
                name: "orders".into(),
                title: None,
                description: None,
                example_questions: vec![],
                sql_table: "orders_table".into(),
                base_where: None,
                dimensions: BTreeMap::new(),
                measures: BTreeMap::new(),
                joins: BTreeMap::new(),
                hierarchies: BTreeMap::new(),
                event_stream: None,
            })
            .unwrap();
        let required = BTreeSet::from(["orders".to_string()]);
        let plan = plan_joins(&registry, "customers", &required).unwrap();
        assert!(plan.fan_out_cubes.contains("orders"));
    }

    #[test]
    fn join_is_found_when_walked_backward_from_the_target_cube() {
        // Only "orders" declares the join; "customers" declares none at all.
        // The graph must still be usable with customers as the base cube.
        let mut registry = CubeRegistry::new();
        registry.register(cube_with_join("orders", "customers", Relationship::BelongsTo)).unwrap();
        registry
            .register(Cube {
                name: "customers".into(),
                title: None,
                description: None,
                example_questions: vec![],
                sql_table: "customers_table".into(),
                base_where: None,
                dimensions: BTreeMap::new(),
                measures: BTreeMap::new(),
                joins: BTreeMap::new(),
                hierarchies: BTreeMap::new(),
                event_stream: None,
            })
            .unwrap();

        let required = BTreeSet::from(["orders".to_string()]);
        let plan = plan_joins(&registry, "customers", &required).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].from_cube, "customers");
        assert_eq!(plan.joins[0].to_cube, "orders");
        // the declared relationship (BelongsTo, from orders' perspective) is
        // preserved verbatim, not inverted for the backward walk.
        assert_eq!(plan.joins[0].join.relationship, Relationship::BelongsTo);
        assert_eq!(plan.joins[0].sql_join_type, SqlJoinType::Inner);
    }
}
