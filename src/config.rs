//! TOML-based configuration with global defaults and per-datasource overrides.
//!
//! Grounded on the teacher's `config::SemaflowConfig`; this is config the
//! embedder may load and resolve, the core itself only consumes the
//! resolved values (query timeouts, row limits, pool sizing, schema-cache
//! TTL, validation strictness).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global defaults applied to all datasources unless overridden.
    pub defaults: GlobalDefaults,

    /// Per-datasource configuration overrides (keyed by datasource name).
    #[serde(default)]
    pub datasources: HashMap<String, DatasourceConfig>,
}

/// Global default settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct GlobalDefaults {
    pub query: QueryConfig,
    pub pool: PoolConfig,
    pub schema_cache: SchemaCacheConfig,
    pub validation: ValidationConfig,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Query timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,
    /// Maximum rows to return (0 = unlimited).
    pub max_row_limit: u64,
    /// Default row limit when not specified in request.
    pub default_row_limit: u64,
}

/// Connection pooling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum pool size (default: 16).
    pub size: usize,
    /// Idle connection timeout in seconds (default: 300).
    pub idle_timeout_secs: u64,
}

/// Schema cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    /// Cache TTL in seconds (default: 3600).
    pub ttl_secs: u64,
    /// Maximum cached schemas (default: 1000).
    pub max_size: usize,
}

/// Validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct ValidationConfig {
    /// Continue on validation errors (default: false).
    pub warn_only: bool,
}

/// Per-datasource configuration (can override globals).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasourceConfig {
    pub query: Option<QueryConfig>,
    pub pool: Option<PoolConfig>,
    pub schema_cache: Option<SchemaCacheConfig>,

    /// DuckDB-specific options.
    pub duckdb: Option<DuckDbConfig>,

    /// PostgreSQL-specific options.
    pub postgres: Option<PostgresConfig>,
}

/// DuckDB-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection pool size (overrides pool.size for Postgres).
    pub pool_size: usize,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

// Default implementations

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_row_limit: 0, // 0 = unlimited
            default_row_limit: 1000,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 16,
            idle_timeout_secs: 300,
        }
    }
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 1000,
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            statement_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CoreError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&contents).map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, or built-in defaults).
    ///
    /// Search order:
    /// 1. `SEMAQORE_CONFIG` environment variable
    /// 2. `./semaqore.toml` (current directory)
    /// 3. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("SEMAQORE_CONFIG") {
            if let Ok(cfg) = Self::from_file(&path) {
                tracing::info!(path = %path, "loaded config from SEMAQORE_CONFIG");
                return cfg;
            }
        }

        if let Ok(cfg) = Self::from_file("semaqore.toml") {
            tracing::info!("loaded config from ./semaqore.toml");
            return cfg;
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Get resolved config for a specific datasource (merges global defaults).
    pub fn for_datasource(&self, name: &str) -> ResolvedDatasourceConfig {
        let ds_config = self.datasources.get(name);
        ResolvedDatasourceConfig::merge(&self.defaults, ds_config)
    }
}

/// Fully resolved configuration for a datasource (no Option fields).
#[derive(Debug, Clone)]
pub struct ResolvedDatasourceConfig {
    pub query: QueryConfig,
    pub pool: PoolConfig,
    pub schema_cache: SchemaCacheConfig,
    pub duckdb: DuckDbConfig,
    pub postgres: PostgresConfig,
}

impl ResolvedDatasourceConfig {
    fn merge(defaults: &GlobalDefaults, override_cfg: Option<&DatasourceConfig>) -> Self {
        match override_cfg {
            Some(ds) => Self {
                query: ds.query.clone().unwrap_or_else(|| defaults.query.clone()),
                pool: ds.pool.clone().unwrap_or_else(|| defaults.pool.clone()),
                schema_cache: ds.schema_cache.clone().unwrap_or_else(|| defaults.schema_cache.clone()),
                duckdb: ds.duckdb.clone().unwrap_or_default(),
                postgres: ds.postgres.clone().unwrap_or_default(),
            },
            None => Self {
                query: defaults.query.clone(),
                pool: defaults.pool.clone(),
                schema_cache: defaults.schema_cache.clone(),
                duckdb: DuckDbConfig::default(),
                postgres: PostgresConfig::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.defaults.query.timeout_ms, 30_000);
        assert_eq!(cfg.defaults.pool.size, 16);
        assert_eq!(cfg.defaults.schema_cache.ttl_secs, 3600);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[defaults.query]
timeout_ms = 60000
max_row_limit = 50000

[datasources.warehouse.postgres]
pool_size = 64
statement_timeout_ms = 10000
"#;
        let cfg = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.defaults.query.timeout_ms, 60_000);
        assert_eq!(cfg.defaults.query.max_row_limit, 50_000);

        let resolved = cfg.for_datasource("warehouse");
        assert_eq!(resolved.postgres.pool_size, 64);
        assert_eq!(resolved.postgres.statement_timeout_ms, 10_000);
    }

    #[test]
    fn test_datasource_override() {
        let toml = r#"
[defaults.pool]
size = 8

[datasources.prod.pool]
size = 32
"#;
        let cfg = EngineConfig::from_toml(toml).unwrap();

        let default_resolved = cfg.for_datasource("unknown");
        assert_eq!(default_resolved.pool.size, 8);

        let prod_resolved = cfg.for_datasource("prod");
        assert_eq!(prod_resolved.pool.size, 32);
    }
}
