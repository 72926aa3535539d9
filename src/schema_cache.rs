//! In-memory cache of fetched table schemas, with a TTL matching the
//! embedder's `schema_cache.ttl_secs` config. Grounded on the teacher's
//! `SchemaCache`; adds expiry since the teacher's cache never evicted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

struct Entry {
    schema: TableSchema,
    inserted_at: Instant,
}

pub struct SchemaCache {
    ttl: Duration,
    schemas: HashMap<(String, String), Entry>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, schemas: HashMap::new() }
    }

    pub fn insert(&mut self, data_source: String, table: String, schema: TableSchema) {
        self.schemas.insert((data_source, table), Entry { schema, inserted_at: Instant::now() });
    }

    pub fn get(&self, data_source: &str, table: &str) -> Option<&TableSchema> {
        let entry = self.schemas.get(&(data_source.to_string(), table.to_string()))?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(&entry.schema)
    }

    pub fn contains(&self, data_source: &str, table: &str) -> bool {
        self.get(data_source, table).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_treated_as_absent() {
        let mut cache = SchemaCache::new(Duration::from_millis(0));
        cache.insert(
            "db".into(),
            "orders".into(),
            TableSchema { columns: vec![], primary_keys: vec![], foreign_keys: vec![] },
        );
        std::thread::sleep(Duration::from_millis(2));
        assert!(!cache.contains("db", "orders"));
    }
}
