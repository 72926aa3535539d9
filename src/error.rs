use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Crate-wide error taxonomy. Every variant is one `kind` string from the
/// error taxonomy table, not a stringly-typed bucket, so callers can match on
/// it instead of parsing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    // --- query/* : validation errors raised while compiling a SemanticQuery ---
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("referenced cubes are not connected by any join path: {0:?}")]
    UnconnectedCubes(Vec<String>),
    #[error("circular reference among calculated measures: {0}")]
    CalcCycle(String),
    #[error("calculated measure '{measure}' references unknown sibling measure '{reference}'")]
    CalcUnresolved { measure: String, reference: String },
    #[error("offset specified without a limit")]
    OffsetWithoutLimit,
    #[error("invalid time granularity: {0}")]
    InvalidGranularity(String),
    #[error("window measure '{0}' references a missing source measure")]
    IncompatibleWindow(String),
    #[error("order references field '{0}' not present in the projection")]
    InvalidOrderField(String),
    #[error("security context is missing required key '{0}'")]
    SecurityContextMissing(String),

    // --- flow/* : flow query validation ---
    #[error("flow query references unknown dimension: {0}")]
    FlowInvalidDimension(String),
    #[error("flow query is missing a starting step filter")]
    FlowMissingStartingStep,
    #[error("flow query step depth {0} is out of range [0, 5]")]
    FlowDepthOutOfRange(i32),
    #[error("LATERAL join strategy requested but the dialect does not support LATERAL joins")]
    FlowLateralUnsupported,
    #[error("flow queries are not supported on this engine")]
    FlowEngineUnsupported,

    // --- exec/* : execution errors ---
    #[error("driver error ({param_count} bound parameters): {message}")]
    DriverError {
        message: String,
        sql: String,
        param_count: usize,
    },
    #[error("query execution was cancelled")]
    Cancelled,
    #[error("query execution timed out")]
    Timeout,
    #[error("driver returned a malformed result where rows were expected")]
    EmptyResultMalformed,

    // --- registry/* : errors raised while registering cubes ---
    #[error("duplicate cube name: {0}")]
    DuplicateCube(String),
    #[error("duplicate field name '{field}' on cube '{cube}'")]
    DuplicateField { cube: String, field: String },
    #[error("join on cube '{cube}' references unresolved target cube '{target}'")]
    UnresolvedJoin { cube: String, target: String },

    // --- meta/* ---
    #[error("metadata unavailable: {0}")]
    MetaUnavailable(String),

    // --- ambient ---
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Stable `kind` string for the wire error shape `{kind, message, sql?, hint?}`.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::UnknownField(_) => "query/unknown-field",
            CoreError::UnconnectedCubes(_) => "query/unconnected-cubes",
            CoreError::CalcCycle(_) => "query/calc-cycle",
            CoreError::CalcUnresolved { .. } => "query/calc-unresolved",
            CoreError::OffsetWithoutLimit => "query/offset-without-limit",
            CoreError::InvalidGranularity(_) => "query/invalid-granularity",
            CoreError::IncompatibleWindow(_) => "query/incompatible-window",
            CoreError::InvalidOrderField(_) => "query/invalid-order-field",
            CoreError::SecurityContextMissing(_) => "query/security-context-missing",
            CoreError::FlowInvalidDimension(_) => "flow/invalid-dimension",
            CoreError::FlowMissingStartingStep => "flow/missing-starting-step",
            CoreError::FlowDepthOutOfRange(_) => "flow/depth-out-of-range",
            CoreError::FlowLateralUnsupported => "flow/lateral-unsupported",
            CoreError::FlowEngineUnsupported => "flow/engine-unsupported",
            CoreError::DriverError { .. } => "exec/driver-error",
            CoreError::Cancelled => "exec/cancelled",
            CoreError::Timeout => "exec/timeout",
            CoreError::EmptyResultMalformed => "exec/empty-result-malformed",
            CoreError::DuplicateCube(_) => "registry/duplicate-cube",
            CoreError::DuplicateField { .. } => "registry/duplicate-field",
            CoreError::UnresolvedJoin { .. } => "registry/unresolved-join",
            CoreError::MetaUnavailable(_) => "meta/unavailable",
            #[cfg(feature = "duckdb")]
            CoreError::DuckDb(_) => "internal",
            #[cfg(feature = "sqlite")]
            CoreError::Sqlite(_) => "internal",
            CoreError::Io(_) | CoreError::Yaml(_) | CoreError::Json(_) | CoreError::Config(_) | CoreError::Other(_) => {
                "internal"
            }
        }
    }

    /// SQL text to surface alongside a driver error. Never the bound values.
    pub fn sql(&self) -> Option<&str> {
        match self {
            CoreError::DriverError { sql, .. } => Some(sql),
            _ => None,
        }
    }
}
