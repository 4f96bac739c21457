//! Search-filter compilation.
//!
//! For list-shaped reads the engine cannot load every record and point-check
//! it; instead each grant's record conditions are compiled into a filter
//! fragment and pushed down to the data store. The result is an OR of ANDs
//! ([`FilterExpression`]): one conjunctive branch per usable grant, each
//! branch also carrying the caller's own search terms.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::condition::{DataType, Operator, parse_date, parse_datetime_secs};
use crate::grant::Grant;

// ============================================================================
// Filter values
// ============================================================================

/// A typed operand in a compiled filter term.
///
/// Operands arrive as strings in stored conditions; compilation casts them
/// to the condition's declared data type so the store compares numbers as
/// numbers and dates as dates.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
    Id(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<FilterValue>),
}

impl FilterValue {
    fn to_json(&self) -> Value {
        match self {
            FilterValue::Number(n) => json!(n),
            FilterValue::Text(s) | FilterValue::Id(s) => json!(s),
            FilterValue::Bool(b) => json!(b),
            FilterValue::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            FilterValue::DateTime(dt) => json!(dt.to_rfc3339()),
            FilterValue::List(items) => {
                Value::Array(items.iter().map(FilterValue::to_json).collect())
            }
        }
    }
}

/// Casts one operand string under a declared data type.
fn cast_operand(dt: DataType, operand: &str) -> Option<FilterValue> {
    match dt {
        DataType::Number => operand.parse::<f64>().ok().map(FilterValue::Number),
        DataType::String => Some(FilterValue::Text(operand.to_string())),
        DataType::Id => Some(FilterValue::Id(operand.to_string())),
        DataType::Boolean => match operand {
            "true" => Some(FilterValue::Bool(true)),
            "false" => Some(FilterValue::Bool(false)),
            _ => None,
        },
        DataType::Date => parse_date(operand).map(FilterValue::Date),
        DataType::DateTime => parse_datetime_secs(operand)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(FilterValue::DateTime),
    }
}

// ============================================================================
// Filter expressions
// ============================================================================

/// One comparison pushed down to the store: `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl FilterTerm {
    pub fn new(field: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// A conjunction of terms (logical AND). Empty matches every record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conjunction {
    pub terms: Vec<FilterTerm>,
}

impl Conjunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, term: FilterTerm) -> Self {
        self.terms.push(term);
        self
    }

    fn to_json(&self) -> Value {
        let mut fields: Map<String, Value> = Map::new();
        for term in &self.terms {
            let entry = fields
                .entry(term.field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(operator_key(term.operator).to_string(), term.value.to_json());
            }
        }
        Value::Object(fields)
    }
}

/// EXISTS compiles to membership: the field must hold one of the operands.
fn operator_key(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "$eq",
        Operator::Ne => "$ne",
        Operator::Gt => "$gt",
        Operator::Gte => "$gte",
        Operator::Lt => "$lt",
        Operator::Lte => "$lte",
        Operator::In | Operator::Exists => "$in",
        Operator::NotIn => "$nin",
    }
}

/// A compiled search filter: OR over conjunctive branches.
///
/// Zero branches is the deny-all filter — the empty disjunction is false, so
/// the store must return no records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpression {
    pub branches: Vec<Conjunction>,
}

impl FilterExpression {
    /// Whether this filter can never match any record.
    pub fn is_deny_all(&self) -> bool {
        self.branches.is_empty()
    }

    /// Renders the filter in document-store syntax.
    ///
    /// Deny-all renders as `{"$nor": [{}]}` (nothing matches "not
    /// everything"); a single branch renders bare; multiple branches render
    /// under `"$or"`.
    pub fn to_json(&self) -> Value {
        match self.branches.as_slice() {
            [] => json!({"$nor": [{}]}),
            [only] => only.to_json(),
            many => json!({"$or": many.iter().map(Conjunction::to_json).collect::<Vec<_>>()}),
        }
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compiles the grants covering a list request into a push-down filter.
///
/// Each grant contributes one branch: the caller's own search terms ANDed
/// with the grant's record conditions, operands resolved against the
/// grant's feature snapshot and cast to their declared types. A grant whose
/// operands cannot be resolved or cast contributes nothing (logged, not
/// fatal — other grants may still authorize the search). Duplicate branches
/// are emitted once; an unconditional grant yields the caller's terms alone.
pub fn compile_search_filter(grants: &[Grant], base: &Conjunction) -> FilterExpression {
    let mut branches: Vec<Conjunction> = Vec::new();

    'grants: for grant in grants {
        let mut branch = base.clone();
        for condition in &grant.record_conditions {
            let Some(operands) = condition.resolve_operands(&grant.features) else {
                warn!(
                    principal = %grant.principal,
                    feature = %condition.feature_name,
                    "grant skipped in filter compilation: principal feature operand unresolved"
                );
                continue 'grants;
            };

            let value = if condition.operator.is_set_operator() {
                let cast: Option<Vec<FilterValue>> = operands
                    .iter()
                    .map(|op| cast_operand(condition.data_type, op))
                    .collect();
                cast.map(FilterValue::List)
            } else {
                operands
                    .first()
                    .and_then(|op| cast_operand(condition.data_type, op))
            };
            let Some(value) = value else {
                warn!(
                    principal = %grant.principal,
                    feature = %condition.feature_name,
                    data_type = %condition.data_type,
                    "grant skipped in filter compilation: operand not castable"
                );
                continue 'grants;
            };

            branch.terms.push(FilterTerm::new(
                condition.feature_name.clone(),
                condition.operator,
                value,
            ));
        }

        if !branches.contains(&branch) {
            branches.push(branch);
        }
    }

    FilterExpression { branches }
}

// ============================================================================
// Tests
// ============================================================================
