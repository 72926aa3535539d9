//! Compiles cube-qualified semantic queries into dialect-specific,
//! parameterized SQL and runs them against a registered backend.
//!
//! [`SemanticEngine`] is the entry point: it bundles a [`CubeRegistry`]
//! (cubes, dimensions, measures, joins, loaded from YAML) with a
//! [`ConnectionManager`] (named datasources, one backend connection each)
//! and exposes `compile`/`execute`/`dryRun`/`explain`/`tableIndexes`/
//! `distinctValues`/`compileFlow` as plain async methods.

pub mod api;
pub mod backends;
pub mod config;
pub mod datetime;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod expr;
pub mod expr_parser;
pub mod explain;
pub mod filter_builder;
pub mod flow_planner;
pub mod join_planner;
pub mod model;
pub mod query;
pub mod query_builder;
pub mod registry;
pub mod schema_cache;
pub mod sql_ast;

pub use api::{CompiledQuery, SemanticEngine};
pub use backends::{BackendConnection, ConnectionManager};
#[cfg(feature = "duckdb")]
pub use backends::DuckDbConnection;
#[cfg(feature = "mysql")]
pub use backends::MySqlConnection;
#[cfg(feature = "postgres")]
pub use backends::PostgresConnection;
#[cfg(feature = "sqlite")]
pub use backends::SqliteConnection;
pub use config::EngineConfig;
pub use error::{CoreError, Result};
pub use executor::{ExecutionContext, ResultSet};
pub use model::{Cube, CubeDescriptor, Dimension, Measure};
pub use query::{QueryContext, SecurityContext, SemanticQuery};
pub use registry::CubeRegistry;

// Dialect re-exports
pub use dialect::Dialect;
#[cfg(feature = "duckdb")]
pub use dialect::DuckDbDialect;
#[cfg(feature = "mysql")]
pub use dialect::MySqlDialect;
#[cfg(feature = "postgres")]
pub use dialect::PostgresDialect;
#[cfg(feature = "sqlite")]
pub use dialect::SqliteDialect;
