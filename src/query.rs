//! The wire-format query shape clients send in, and the security/execution
//! context the engine always threads alongside it.
//!
//! Grounded on the teacher's `flows::QueryRequest`/`Filter`/`OrderItem`, with
//! the filter tree widened to accept both the flat `{field, op, values}` shape
//! and the nested `{type: and|or, filters: [...]}` logical-grouping shape
//! callers actually send, and a `time_dimensions` block split out instead of
//! being folded into the plain filter list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime::DateRangeSpec;
use crate::model::SortDirection;

/// Values that must never be interpolated into SQL text except as bound
/// parameters. Carried alongside a query, not inside it, so a query plan can
/// be logged/cached without leaking tenant identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl SecurityContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Everything the engine needs to resolve a query besides the query body
/// itself: the caller's security context and an injectable clock for
/// relative date-range resolution.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub security: SecurityContext,
    pub now: DateTime<Utc>,
}

impl QueryContext {
    pub fn new(security: SecurityContext) -> Self {
        Self { security, now: Utc::now() }
    }

    pub fn with_now(security: SecurityContext, now: DateTime<Utc>) -> Self {
        Self { security, now }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    InDateRange,
    Set,
    NotSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafFilter {
    pub member: String,
    pub operator: FilterOp,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

/// A filter tree node. Accepts either a leaf `{member, operator, values}` or a
/// logical grouping `{and: [...]}` / `{or: [...]}`; client payloads commonly
/// send both shapes interchangeably, so both deserialize into this one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterCondition {
    Leaf(LeafFilter),
    Group {
        #[serde(flatten)]
        group: FilterGroup,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterGroup {
    #[serde(rename = "and")]
    And(Vec<FilterCondition>),
    #[serde(rename = "or")]
    Or(Vec<FilterCondition>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDimensionRequest {
    pub dimension: String,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRangeSpec>,
    /// When set, also compute the immediately preceding period of equal
    /// length and union it into the result, each row labelled by a trailing
    /// `__period` column of `"current"` or `"prior"`.
    #[serde(default)]
    pub compare_to_prior_period: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub field: String,
    pub direction: SortDirection,
}

/// A step in a flow query: one layer of the Sankey/sunburst funnel, keyed by
/// the binding dimension's value at that step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowQueryConfig {
    pub event_stream: String,
    pub step_dimension: String,
    #[serde(default)]
    pub starting_step: Option<Value>,
    pub steps_before: i32,
    pub steps_after: i32,
    #[serde(default)]
    pub strategy: FlowStrategy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStrategy {
    #[default]
    Auto,
    Lateral,
    Window,
}

/// The declarative query shape: cube-qualified dimensions/measures, a filter
/// tree, optional time dimensions, ordering, and pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub time_dimensions: Vec<TimeDimensionRequest>,
    #[serde(default)]
    pub order: Vec<OrderItem>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub flow: Option<FlowQueryConfig>,
}

impl SemanticQuery {
    /// Every `cube.field` name this query mentions, across dimensions,
    /// measures, filters, time dimensions, and ordering — used up front by
    /// the join planner to determine which cubes must be connected.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        fields.extend(self.dimensions.iter().cloned());
        fields.extend(self.measures.iter().cloned());
        fields.extend(self.time_dimensions.iter().map(|t| t.dimension.clone()));
        fields.extend(self.order.iter().map(|o| o.field.clone()));
        collect_filter_fields(&self.filters, &mut fields);
        fields
    }
}

fn collect_filter_fields(conditions: &[FilterCondition], out: &mut Vec<String>) {
    for cond in conditions {
        match cond {
            FilterCondition::Leaf(leaf) => out.push(leaf.member.clone()),
            FilterCondition::Group { group } => match group {
                FilterGroup::And(inner) | FilterGroup::Or(inner) => collect_filter_fields(inner, out),
            },
        }
    }
}
