//! Database backend implementations.
//!
//! Each backend is implemented in its own file and gated behind a feature flag.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{EngineConfig, ResolvedDatasourceConfig};
use crate::dialect::{Dialect, ExplainMode};
use crate::error::Result;
use crate::executor::QueryResult;
use crate::explain::{ExplainResult, IndexInfo};
use crate::schema_cache::TableSchema;

/// Unified interface for all database backends. Every SQL-executing method
/// takes pre-rendered SQL text plus its bound parameters — the backend is
/// responsible for binding them via the driver's prepared-statement API,
/// never for interpolating them into the text.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);
    async fn fetch_schema(&self, table: &str) -> Result<TableSchema>;
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
    async fn explain_sql(&self, sql: &str, params: &[Value], mode: ExplainMode) -> Result<ExplainResult>;
    async fn fetch_indexes(&self, tables: &[String]) -> Result<Vec<IndexInfo>>;
}

/// Connection manager keyed by data source name.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: HashMap<String, Arc<dyn BackendConnection>>,
    config: Option<EngineConfig>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self { connections: HashMap::new(), config: None }
    }

    /// Create a connection manager with configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self { connections: HashMap::new(), config: Some(config) }
    }

    /// Get the configuration, if set.
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    /// Get resolved configuration for a specific datasource.
    pub fn config_for(&self, name: &str) -> ResolvedDatasourceConfig {
        match &self.config {
            Some(cfg) => cfg.for_datasource(name),
            None => EngineConfig::default().for_datasource(name),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, conn: Arc<dyn BackendConnection>) {
        self.connections.insert(name.into(), conn);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BackendConnection>> {
        self.connections.get(name)
    }
}

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbConnection;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "mysql")]
pub use mysql::MySqlConnection;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
