//! Dialect-neutral declarative expressions: the SQL reference a dimension or
//! measure declares before it is bound to a query context.
//!
//! Grounded on the teacher's `flows::Expr`, generalized to the function and
//! binary-operator vocabulary the resolver understands. Kept separate from
//! `sql_ast::SqlExpr` (the compiled, parameter-bound IR): this is what gets
//! registered; that is what gets rendered.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SqlRef {
    Column { column: String },
    Literal { value: Value },
    /// A value pulled from the request's `SecurityContext` by key, e.g. a
    /// tenant id enforced in a cube's `base_where`.
    SecurityContext { key: String },
    Func { func: SqlFunction, args: Vec<SqlRef> },
    Case { branches: Vec<CaseBranch>, else_expr: Box<SqlRef> },
    Binary { op: SqlRefOp, left: Box<SqlRef>, right: Box<SqlRef> },
}

impl<'de> Deserialize<'de> for SqlRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(SqlRef::Column { column: s }),
            other => {
                #[derive(Deserialize)]
                #[serde(tag = "type", rename_all = "snake_case")]
                enum Tagged {
                    Column { column: String },
                    Literal { value: Value },
                    SecurityContext { key: String },
                    Func { func: SqlFunction, args: Vec<SqlRef> },
                    Case { branches: Vec<CaseBranch>, else_expr: Box<SqlRef> },
                    Binary { op: SqlRefOp, left: Box<SqlRef>, right: Box<SqlRef> },
                }
                let tagged = Tagged::deserialize(other).map_err(de::Error::custom)?;
                Ok(match tagged {
                    Tagged::Column { column } => SqlRef::Column { column },
                    Tagged::Literal { value } => SqlRef::Literal { value },
                    Tagged::SecurityContext { key } => SqlRef::SecurityContext { key },
                    Tagged::Func { func, args } => SqlRef::Func { func, args },
                    Tagged::Case { branches, else_expr } => SqlRef::Case { branches, else_expr },
                    Tagged::Binary { op, left, right } => SqlRef::Binary { op, left, right },
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: SqlRef,
    pub then: SqlRef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SqlRefOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
}

/// The whitelisted function vocabulary available to declared dimension/measure
/// expressions and to calculated-measure formulas. Anything not in this set
/// is rejected at registration time, never passed through to SQL text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SqlFunction {
    DateTruncDay,
    DateTruncWeek,
    DateTruncMonth,
    DateTruncQuarter,
    DateTruncYear,
    Lower,
    Upper,
    Concat,
    Substring,
    Length,
    Trim,
    Coalesce,
    NullIf,
    Greatest,
    Least,
    SafeDivide,
    Abs,
    Ceil,
    Floor,
    Round,
    Cast(CastType),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Numeric,
    Text,
    Boolean,
    Timestamp,
}
