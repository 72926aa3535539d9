//! Loads and indexes cubes. Grounded on the teacher's `ModelRegistry`
//! (glob-load YAML files from a directory into a name-keyed map), generalized
//! from two flat maps (`tables`, `models`) to one: a cube owns its own
//! dimensions, measures, and joins, so there is only one namespace to index.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::glob;

use crate::error::CoreError;
use crate::model::{Cube, CubeDescriptor, FieldDescriptor, Join, RelationshipDescriptor};

#[derive(Debug, Default, Clone)]
pub struct CubeRegistry {
    cubes: BTreeMap<String, Cube>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single cube, filling in its dimensions'/measures' `name`
    /// field from the map key they were declared under (the wire format
    /// keys a dimension/measure by name and repeats it nowhere else).
    pub fn register(&mut self, mut cube: Cube) -> Result<(), CoreError> {
        if self.cubes.contains_key(&cube.name) {
            return Err(CoreError::DuplicateCube(cube.name.clone()));
        }

        for (key, dim) in cube.dimensions.iter_mut() {
            dim.name = key.clone();
        }
        for (key, measure) in cube.measures.iter_mut() {
            measure.name = key.clone();
        }

        let mut seen = std::collections::HashSet::new();
        for name in cube.dimensions.keys().chain(cube.measures.keys()) {
            if !seen.insert(name) {
                return Err(CoreError::DuplicateField { cube: cube.name.clone(), field: name.clone() });
            }
        }

        self.cubes.insert(cube.name.clone(), cube);
        Ok(())
    }

    /// Load every `*.yml`/`*.yaml` file under `dir` as a cube definition.
    pub fn load_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), CoreError> {
        let dir = dir.as_ref();
        for pattern in ["*.yml", "*.yaml"] {
            for entry in glob(&format!("{}/{pattern}", dir.display()))
                .map_err(|e| CoreError::Other(e.into()))?
                .flatten()
            {
                let contents = fs::read_to_string(&entry)?;
                let cube: Cube = serde_yaml::from_str(&contents)?;
                self.register(cube)?;
            }
        }
        Ok(())
    }

    /// Validate that every join's target cube actually exists, once all
    /// cubes in a loading pass have been registered.
    pub fn validate_joins(&self) -> Result<(), CoreError> {
        for cube in self.cubes.values() {
            for join in cube.joins.values() {
                if !self.cubes.contains_key(&join.target_cube) {
                    return Err(CoreError::UnresolvedJoin { cube: cube.name.clone(), target: join.target_cube.clone() });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Cube> {
        self.cubes.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Cube, CoreError> {
        self.get(name).ok_or_else(|| CoreError::UnknownField(name.to_string()))
    }

    pub fn cubes(&self) -> impl Iterator<Item = &Cube> {
        self.cubes.values()
    }

    pub fn joins_from<'a>(&'a self, cube_name: &str) -> Box<dyn Iterator<Item = (&'a str, &'a Join)> + 'a> {
        match self.cubes.get(cube_name) {
            Some(cube) => Box::new(cube.joins.iter().map(|(name, j)| (name.as_str(), j))),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Flattened metadata shaped for ERD/chart clients: every cube's fields
    /// and the relationships it declares to other cubes.
    pub fn metadata(&self) -> Vec<CubeDescriptor> {
        self.cubes
            .values()
            .map(|cube| CubeDescriptor {
                name: cube.name.clone(),
                title: cube.title.clone(),
                description: cube.description.clone(),
                dimensions: cube
                    .dimensions
                    .values()
                    .map(|d| FieldDescriptor {
                        name: d.name.clone(),
                        title: d.title.clone(),
                        description: d.description.clone(),
                        field_type: format!("{:?}", d.field_type).to_lowercase(),
                    })
                    .collect(),
                measures: cube
                    .measures
                    .values()
                    .map(|m| FieldDescriptor {
                        name: m.name.clone(),
                        title: m.title.clone(),
                        description: m.description.clone(),
                        field_type: "number".to_string(),
                    })
                    .collect(),
                hierarchies: cube.hierarchies.values().cloned().collect(),
                relationships: cube
                    .joins
                    .values()
                    .map(|j| RelationshipDescriptor { target_cube: j.target_cube.clone(), relationship: j.relationship })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;

    fn minimal_cube(name: &str) -> Cube {
        Cube {
            name: name.to_string(),
            title: None,
            description: None,
            example_questions: vec![],
            sql_table: format!("{name}_table"),
            base_where: None,
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
            joins: BTreeMap::new(),
            hierarchies: BTreeMap::new(),
            event_stream: None,
        }
    }

    #[test]
    fn rejects_duplicate_cube_names() {
        let mut registry = CubeRegistry::new();
        registry.register(minimal_cube("orders")).unwrap();
        let err = registry.register(minimal_cube("orders")).unwrap_err();
        assert_eq!(err.kind(), "registry/duplicate-cube");
    }

    #[test]
    fn validate_joins_flags_unresolved_target() {
        let mut cube = minimal_cube("orders");
        cube.joins.insert(
            "customer".to_string(),
            Join {
                target_cube: "customers".to_string(),
                relationship: crate::model::Relationship::BelongsTo,
                on: vec![],
                preferred_for: vec![],
            },
        );
        let mut registry = CubeRegistry::new();
        registry.register(cube).unwrap();
        let err = registry.validate_joins().unwrap_err();
        assert_eq!(err.kind(), "registry/unresolved-join");
    }

    #[test]
    fn dimension_name_is_filled_from_map_key() {
        let mut cube = minimal_cube("orders");
        cube.dimensions.insert(
            "status".to_string(),
            crate::model::Dimension {
                name: String::new(),
                title: None,
                description: None,
                sql: crate::expr::SqlRef::Column { column: "status".to_string() },
                field_type: FieldType::String,
                primary_key: false,
            },
        );
        let mut registry = CubeRegistry::new();
        registry.register(cube).unwrap();
        assert_eq!(registry.get("orders").unwrap().dimensions["status"].name, "status");
    }
}
