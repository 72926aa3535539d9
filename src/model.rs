//! The cube data model: cubes, dimensions, measures, joins, hierarchies.
//!
//! Grounded on the teacher's `flows.rs` shape (BTreeMap-keyed field maps,
//! custom `Deserialize` impls accepting shorthand wire forms) but
//! restructured so a single registered unit — the cube — owns its own joins,
//! per the data model described for the query surface this compiles.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::expr::SqlRef;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Time,
}

/// A named analytical entity binding a base relation to dimensions, measures, and joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cube {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub example_questions: Vec<String>,
    /// The table or alias this cube selects from, and an optional mandatory predicate
    /// (e.g. enforcing `security_context.organisation_id`).
    pub sql_table: String,
    #[serde(default)]
    pub base_where: Option<SqlRef>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, Dimension>,
    #[serde(default)]
    pub measures: BTreeMap<String, Measure>,
    #[serde(default)]
    pub joins: BTreeMap<String, Join>,
    #[serde(default)]
    pub hierarchies: BTreeMap<String, Hierarchy>,
    /// Marks this cube as an event stream usable as the base of a flow query.
    #[serde(default)]
    pub event_stream: Option<EventStreamMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStreamMeta {
    pub binding_key: String,
    pub time_dimension: String,
    pub event_dimension: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dimension {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sql: SqlRef,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub primary_key: bool,
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Full {
            title: Option<String>,
            description: Option<String>,
            sql: SqlRef,
            #[serde(rename = "type")]
            field_type: FieldType,
            #[serde(default)]
            primary_key: bool,
        }
        let full = Full::deserialize(deserializer).map_err(de::Error::custom)?;
        Ok(Dimension {
            name: String::new(),
            title: full.title,
            description: full.description,
            sql: full.sql,
            field_type: full.field_type,
            primary_key: full.primary_key,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MeasureFormat {
    Number,
    Percent,
    Currency,
}

/// Simple aggregation kinds. `CountDistinctApprox` and percentile aggregations
/// (`Median`, `P95`) are statistical; the rest are ordinary SQL aggregates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SimpleAgg {
    Count,
    CountDistinct,
    CountDistinctApprox,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
    Median,
    P95,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WindowKind {
    Lag,
    Rank,
    MovingSum,
    MovingAvg,
    RunningTotal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WindowOp {
    Raw,
    Difference,
    PercentChange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameBound {
    Unbounded,
    Current,
    Preceding(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowFrame {
    pub start: FrameBound,
    pub end: FrameBound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub kind: WindowKind,
    /// Short name of the measure this window function draws from.
    pub source_measure: String,
    #[serde(default = "default_window_op")]
    pub op: WindowOp,
    pub order_by: Vec<OrderKey>,
    #[serde(default)]
    pub frame: Option<WindowFrame>,
}

fn default_window_op() -> WindowOp {
    WindowOp::Raw
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The four measure shapes named by the data model. A calculated measure
/// carries both the raw template string (for error messages) and its parsed,
/// whitelisted AST (built once at registration).
#[derive(Debug, Clone, Serialize)]
pub enum MeasureKind {
    Simple { sql: SqlRef, agg: SimpleAgg },
    Calculated { template: String, ast: crate::expr_parser::CalcAst },
    Window(WindowSpec),
}

#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<MeasureFormat>,
    pub kind: MeasureKind,
    /// Row-level predicates injected into the aggregate (`FILTER (WHERE ...)` or
    /// an inline `CASE WHEN` fallback).
    pub filters: Vec<crate::query::FilterCondition>,
    #[serde(default)]
    pub drill_members: Vec<String>,
}

impl Measure {
    pub fn is_calculated(&self) -> bool {
        matches!(self.kind, MeasureKind::Calculated { .. })
    }

    pub fn is_window(&self) -> bool {
        matches!(self.kind, MeasureKind::Window(_))
    }
}

impl<'de> Deserialize<'de> for Measure {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            title: Option<String>,
            description: Option<String>,
            format: Option<MeasureFormat>,
            #[serde(default)]
            sql: Option<SqlRef>,
            #[serde(default)]
            agg: Option<SimpleAgg>,
            #[serde(default)]
            formula: Option<String>,
            #[serde(default)]
            window: Option<WindowSpec>,
            #[serde(default)]
            drill_members: Vec<String>,
            #[serde(default)]
            filters: Vec<crate::query::FilterCondition>,
        }
        let raw = Raw::deserialize(deserializer)?;

        let shapes = [raw.agg.is_some() || raw.sql.is_some(), raw.formula.is_some(), raw.window.is_some()]
            .iter()
            .filter(|&&x| x)
            .count();
        if shapes != 1 {
            return Err(de::Error::custom(
                "measure must specify exactly one of: 'sql'+'agg', 'formula', or 'window'",
            ));
        }

        let kind = if let Some(formula) = raw.formula {
            let ast = crate::expr_parser::parse_calc_formula(&formula).map_err(de::Error::custom)?;
            MeasureKind::Calculated { template: formula, ast }
        } else if let Some(window) = raw.window {
            MeasureKind::Window(window)
        } else {
            let sql = raw.sql.ok_or_else(|| de::Error::custom("simple measure requires 'sql'"))?;
            let agg = raw.agg.ok_or_else(|| de::Error::custom("simple measure requires 'agg'"))?;
            MeasureKind::Simple { sql, agg }
        };

        Ok(Measure {
            name: String::new(),
            title: raw.title,
            description: raw.description,
            format: raw.format,
            kind,
            filters: raw.filters,
            drill_members: raw.drill_members,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Relationship {
    BelongsTo,
    HasOne,
    HasMany,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinKeyPair {
    pub source_column: String,
    pub target_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub target_cube: String,
    pub relationship: Relationship,
    pub on: Vec<JoinKeyPair>,
    #[serde(default)]
    pub preferred_for: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    pub levels: Vec<String>,
}

/// Descriptor returned by `CubeRegistry::metadata()` — shaped for ERD/chart clients.
#[derive(Debug, Clone, Serialize)]
pub struct CubeDescriptor {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub dimensions: Vec<FieldDescriptor>,
    pub measures: Vec<FieldDescriptor>,
    pub hierarchies: Vec<Hierarchy>,
    pub relationships: Vec<RelationshipDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub field_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipDescriptor {
    pub target_cube: String,
    pub relationship: Relationship,
}

pub(crate) fn json_to_field_type(v: &Value) -> FieldType {
    match v {
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        _ => FieldType::String,
    }
}
