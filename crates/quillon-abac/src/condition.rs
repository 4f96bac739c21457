//! Feature conditions and the predicate evaluator.
//!
//! A [`FeatureCondition`] compares one record field (or request parameter)
//! against an operand list. Conditions are stored on policies and evaluated
//! lazily, per record, at request time. Evaluation is total: unknown
//! operator/data-type combinations are rejected up front by
//! [`FeatureCondition::validate`] at policy-load time, never at evaluation
//! time.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::feature::FeatureSet;
use quillon_types::{FieldRef, field_values};

/// Error type for condition validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// Operator is not defined for the condition's data type.
    #[error("operator {operator} is not valid for data type {data_type} (feature '{feature}')")]
    InvalidOperatorForType {
        feature: String,
        operator: Operator,
        data_type: DataType,
    },

    /// The operand list is empty.
    #[error("condition on feature '{feature}' has an empty operand list")]
    EmptyOperandList { feature: String },

    /// A principal-feature operand must name exactly one feature.
    #[error("condition on feature '{feature}' resolves a principal feature but names {count} operands")]
    MalformedPrincipalOperand { feature: String, count: usize },
}

// ============================================================================
// DataType / Operator
// ============================================================================

/// The declared type of the field a condition targets.
///
/// Drives the comparison semantics: numeric comparisons cast both sides to
/// numbers, DATE compares by calendar day, DATETIME down to seconds, and
/// ID/STRING compare as strings after stringification (tolerating
/// object-id-vs-string representational drift in stored records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "NUMBER")]
    Number,
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "DATE")]
    Date,
    #[serde(rename = "DATETIME")]
    DateTime,
    #[serde(rename = "ID")]
    Id,
    #[serde(rename = "BOOLEAN")]
    Boolean,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            DataType::Number => "NUMBER",
            DataType::String => "STRING",
            DataType::Date => "DATE",
            DataType::DateTime => "DATETIME",
            DataType::Id => "ID",
            DataType::Boolean => "BOOLEAN",
        };
        write!(f, "{token}")
    }
}

/// Comparison operator. The nine tokens here are the stored-policy
/// representation (`selectedOperator`) and must not be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "NE")]
    Ne,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GTE")]
    Gte,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "LTE")]
    Lte,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT_IN")]
    NotIn,
    #[serde(rename = "EXISTS")]
    Exists,
}

impl Operator {
    /// Whether this operator compares against the whole operand list
    /// (set semantics) rather than the first value.
    pub fn is_set_operator(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Exists)
    }

    /// Whether this operator requires an ordered data type.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Exists => "EXISTS",
        };
        write!(f, "{token}")
    }
}

// ============================================================================
// OperandList
// ============================================================================

/// Operand values as stored on a policy document (`selectedValueList`).
///
/// Stored policies carry either a literal comma-joined string
/// (`"draft,pending"`) or, when the operand is resolved from the evaluating
/// principal's features, a one-element list naming the feature
/// (`["ROLE_LIST"]`). Both representations are preserved through
/// serialization for interop with existing stored policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandList {
    Joined(String),
    List(Vec<String>),
}

impl OperandList {
    /// Normalizes to the list of operand values.
    pub fn values(&self) -> Vec<String> {
        match self {
            OperandList::Joined(s) => {
                if s.is_empty() {
                    Vec::new()
                } else {
                    s.split(',').map(str::to_string).collect()
                }
            }
            OperandList::List(v) => v.clone(),
        }
    }

    /// Returns the first operand value, if any.
    pub fn first(&self) -> Option<String> {
        self.values().into_iter().next()
    }

    /// Number of operand values.
    pub fn len(&self) -> usize {
        self.values().len()
    }

    /// Whether the operand list is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            OperandList::Joined(s) => s.is_empty(),
            OperandList::List(v) => v.is_empty(),
        }
    }
}

impl From<Vec<String>> for OperandList {
    fn from(values: Vec<String>) -> Self {
        OperandList::List(values)
    }
}

impl From<&str> for OperandList {
    fn from(joined: &str) -> Self {
        OperandList::Joined(joined.to_string())
    }
}

// ============================================================================
// FeatureCondition
// ============================================================================

/// A single declarative comparison stored on a policy.
///
/// When `is_principal_feature` is set, the operand is resolved at evaluation
/// time from the evaluating principal's feature named by the first operand
/// value; otherwise the operand list is literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCondition {
    /// Field (dot-path) on the record, or feature name on the principal.
    #[serde(rename = "featureName")]
    pub feature_name: String,

    /// Declared type of the compared values.
    #[serde(rename = "dataType")]
    pub data_type: DataType,

    /// Stored as one of the nine operator tokens.
    #[serde(rename = "selectedOperator")]
    pub operator: Operator,

    /// Resolve the operand from the principal's features at evaluation time.
    #[serde(rename = "isUserFeature", default)]
    pub is_principal_feature: bool,

    /// Literal operand values, or the name of the principal feature.
    #[serde(rename = "selectedValueList")]
    pub operands: OperandList,
}

impl FeatureCondition {
    /// Creates a condition with literal operands.
    pub fn literal(
        feature_name: impl Into<String>,
        data_type: DataType,
        operator: Operator,
        operands: impl Into<OperandList>,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            data_type,
            operator,
            is_principal_feature: false,
            operands: operands.into(),
        }
    }

    /// Creates a condition whose operand is resolved from the evaluating
    /// principal's feature with the given name.
    pub fn principal_feature(
        feature_name: impl Into<String>,
        data_type: DataType,
        operator: Operator,
        principal_feature: impl Into<String>,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            data_type,
            operator,
            is_principal_feature: true,
            operands: OperandList::List(vec![principal_feature.into()]),
        }
    }

    /// Validates the operator/data-type combination and the operand shape.
    ///
    /// Called at policy-load time; evaluation itself is total and never
    /// reports configuration errors.
    pub fn validate(&self) -> Result<(), ConditionError> {
        if self.operands.is_empty() {
            return Err(ConditionError::EmptyOperandList {
                feature: self.feature_name.clone(),
            });
        }
        if self.is_principal_feature && self.operands.len() != 1 {
            return Err(ConditionError::MalformedPrincipalOperand {
                feature: self.feature_name.clone(),
                count: self.operands.len(),
            });
        }
        let ordered = matches!(
            self.data_type,
            DataType::Number | DataType::Date | DataType::DateTime
        );
        if self.operator.is_ordering() && !ordered {
            return Err(ConditionError::InvalidOperatorForType {
                feature: self.feature_name.clone(),
                operator: self.operator,
                data_type: self.data_type,
            });
        }
        Ok(())
    }

    /// Resolves the effective operand values against a principal's features.
    ///
    /// Returns `None` when the condition names a principal feature the
    /// principal does not hold — callers must treat that as a failed
    /// condition (deny), never as an unconditional pass.
    pub fn resolve_operands(&self, features: &FeatureSet) -> Option<Vec<String>> {
        if self.is_principal_feature {
            let name = self.operands.first()?;
            features.get(&name).map(<[String]>::to_vec)
        } else {
            Some(self.operands.values())
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Outcome of evaluating one condition against one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// The condition holds.
    Pass,
    /// The condition does not hold.
    Fail,
    /// The field is absent from the record; the condition is non-blocking.
    Skip,
}

/// What to do when a condition's target field is absent from the record.
///
/// The platform's historical behavior is `Skip` (permissive): a policy with
/// mixed conditions applies uniformly to heterogeneous record shapes, e.g.
/// list-permission probes evaluated against an empty stub record. `Fail`
/// turns absence into a denial for deployments that prefer strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingFieldPolicy {
    #[default]
    Skip,
    Fail,
}

/// Evaluates a single condition against a looked-up field.
///
/// `operands` must already be resolved (see
/// [`FeatureCondition::resolve_operands`]). Scalar operators (EQ/NE and the
/// orderings) compare against the first operand; set operators (IN/NOT_IN/
/// EXISTS) compare the field coerced to a list against the whole operand
/// list. A field that crossed an array is evaluated existentially: the
/// condition passes if any element satisfies it.
pub fn evaluate_condition(
    field: &FieldRef<'_>,
    condition: &FeatureCondition,
    operands: &[String],
    missing_field: MissingFieldPolicy,
) -> ConditionOutcome {
    if field.is_missing() {
        return match missing_field {
            MissingFieldPolicy::Skip => ConditionOutcome::Skip,
            MissingFieldPolicy::Fail => ConditionOutcome::Fail,
        };
    }

    let candidates = field.values();
    let dt = condition.data_type;

    let pass = match condition.operator {
        Operator::Eq => match operands.first() {
            Some(op) => candidates.iter().any(|v| scalar_eq(v, op, dt)),
            None => false,
        },
        Operator::Ne => match operands.first() {
            Some(op) => candidates.iter().any(|v| !scalar_eq(v, op, dt)),
            None => false,
        },
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => match operands.first() {
            Some(op) => candidates
                .iter()
                .any(|v| ordering_holds(condition.operator, v, op, dt)),
            None => false,
        },
        Operator::In | Operator::Exists => intersects(&candidates, operands, dt),
        Operator::NotIn => !intersects(&candidates, operands, dt),
    };

    if pass {
        ConditionOutcome::Pass
    } else {
        ConditionOutcome::Fail
    }
}

/// Evaluates every condition against a record, resolving principal-feature
/// operands from `features`.
///
/// Returns `true` only if every condition either passes or skips
/// (logical AND); an empty condition list always passes — a policy with no
/// record conditions is an unconditional grant. A condition whose
/// principal-feature operand cannot be resolved fails conservatively.
pub fn check_record_permission(
    record: &Value,
    features: &FeatureSet,
    conditions: &[FeatureCondition],
    missing_field: MissingFieldPolicy,
) -> bool {
    conditions.iter().all(|condition| {
        let Some(operands) = condition.resolve_operands(features) else {
            return false;
        };
        let field = field_values(record, &condition.feature_name);
        evaluate_condition(&field, condition, &operands, missing_field) != ConditionOutcome::Fail
    })
}

// ============================================================================
// Typed comparison helpers
// ============================================================================

/// Set-intersection test between the field's coerced value list and the
/// operand list, under the condition's data type.
fn intersects(candidates: &[&Value], operands: &[String], dt: DataType) -> bool {
    // One extra level of flattening: a nested element value may itself be an
    // array (e.g. `lines.tags`).
    let mut flat: Vec<&Value> = Vec::new();
    for v in candidates {
        match v {
            Value::Array(items) => flat.extend(items.iter()),
            other => flat.push(other),
        }
    }
    flat.iter()
        .any(|v| operands.iter().any(|op| scalar_eq(v, op, dt)))
}

/// Typed equality between a record value and one operand string.
fn scalar_eq(value: &Value, operand: &str, dt: DataType) -> bool {
    match dt {
        DataType::Number => match (value_as_number(value), operand.parse::<f64>()) {
            (Some(a), Ok(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        DataType::Date => match (value_as_date(value), parse_date(operand)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        DataType::DateTime => match (value_as_datetime_secs(value), parse_datetime_secs(operand)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        DataType::String | DataType::Id | DataType::Boolean => value_to_string(value) == operand,
    }
}

/// Typed ordering test for GT/GTE/LT/LTE.
fn ordering_holds(op: Operator, value: &Value, operand: &str, dt: DataType) -> bool {
    let ord = match dt {
        DataType::Number => match (value_as_number(value), operand.parse::<f64>()) {
            (Some(a), Ok(b)) => a.partial_cmp(&b),
            _ => None,
        },
        DataType::Date => match (value_as_date(value), parse_date(operand)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
        DataType::DateTime => match (value_as_datetime_secs(value), parse_datetime_secs(operand)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
        // Rejected by validate(); unreachable through loaded policies.
        DataType::String | DataType::Id | DataType::Boolean => None,
    };
    match ord {
        Some(ord) => match op {
            Operator::Gt => ord.is_gt(),
            Operator::Gte => ord.is_ge(),
            Operator::Lt => ord.is_lt(),
            Operator::Lte => ord.is_le(),
            _ => false,
        },
        None => false,
    }
}

/// Stringifies a JSON value for STRING/ID/BOOLEAN comparison.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Interprets a record value as a calendar date (year/month/day only).
///
/// Numbers are treated as epoch milliseconds (document-store convention).
fn value_as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

/// Interprets a record value as a datetime truncated to whole seconds.
///
/// Sub-second and timezone noise must never affect authorization.
fn value_as_datetime_secs(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_datetime_secs(s),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            Some(millis.div_euclid(1000))
        }
        _ => None,
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

pub(crate) fn parse_datetime_secs(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp());
        }
    }
    // A bare date compares as midnight UTC.
    parse_date(s).map(|d| d.and_hms_opt(0, 0, 0).map(|n| n.and_utc().timestamp()))?
}

/// Set intersection over string lists (used by the policy matcher for
/// principal-feature comparisons).
pub(crate) fn string_sets_intersect(a: &[String], b: &[String]) -> bool {
    let set: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    b.iter().any(|v| set.contains(v.as_str()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    fn eval(record: &Value, condition: &FeatureCondition) -> ConditionOutcome {
        let field = field_values(record, &condition.feature_name);
        let operands = condition.operands.values();
        evaluate_condition(&field, condition, &operands, MissingFieldPolicy::Skip)
    }

    #[test]
    fn test_operand_list_joined_string() {
        let list = OperandList::Joined("draft,pending,posted".to_string());
        assert_eq!(list.values(), vec!["draft", "pending", "posted"]);
        assert_eq!(list.first().as_deref(), Some("draft"));
        assert!(!list.is_empty());
    }

    #[test]
    fn test_operand_list_serde_preserves_stored_shapes() {
        // Literal comma-joined string stays a string.
        let joined: OperandList = serde_json::from_str("\"a,b\"").unwrap();
        assert_eq!(serde_json::to_string(&joined).unwrap(), "\"a,b\"");

        // Principal-feature one-element list stays a list.
        let list: OperandList = serde_json::from_str("[\"ROLE_LIST\"]").unwrap();
        assert_eq!(serde_json::to_string(&list).unwrap(), "[\"ROLE_LIST\"]");
    }

    #[test]
    fn test_condition_stored_document_roundtrip() {
        let doc = json!({
            "featureName": "status",
            "dataType": "STRING",
            "selectedOperator": "IN",
            "selectedValueList": "draft,pending"
        });
        let condition: FeatureCondition = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(condition.operator, Operator::In);
        assert!(!condition.is_principal_feature);
        assert_eq!(serde_json::to_value(&condition).unwrap()["selectedValueList"], json!("draft,pending"));
    }

    #[test_case(Operator::Gt, DataType::String)]
    #[test_case(Operator::Gte, DataType::Id)]
    #[test_case(Operator::Lte, DataType::Boolean)]
    fn test_validate_rejects_ordering_on_unordered_types(op: Operator, dt: DataType) {
        let condition = FeatureCondition::literal("f", dt, op, "x");
        assert!(matches!(
            condition.validate(),
            Err(ConditionError::InvalidOperatorForType { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_operands() {
        let condition =
            FeatureCondition::literal("f", DataType::String, Operator::Eq, Vec::<String>::new());
        assert_eq!(
            condition.validate(),
            Err(ConditionError::EmptyOperandList {
                feature: "f".to_string()
            })
        );
    }

    #[test]
    fn test_validate_accepts_ordering_on_number_and_dates() {
        for dt in [DataType::Number, DataType::Date, DataType::DateTime] {
            let condition = FeatureCondition::literal("f", dt, Operator::Gte, "1");
            assert!(condition.validate().is_ok());
        }
    }

    #[test]
    fn test_eq_numeric_casts_both_sides() {
        let condition = FeatureCondition::literal("amount", DataType::Number, Operator::Eq, "12");
        assert_eq!(eval(&json!({"amount": 12}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"amount": "12"}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"amount": 13}), &condition), ConditionOutcome::Fail);
    }

    #[test]
    fn test_numeric_ordering() {
        let condition = FeatureCondition::literal("amount", DataType::Number, Operator::Gte, "100");
        assert_eq!(eval(&json!({"amount": 100}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"amount": 250.5}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"amount": 99.9}), &condition), ConditionOutcome::Fail);
    }

    #[test]
    fn test_date_compares_calendar_day_only() {
        let condition =
            FeatureCondition::literal("postedOn", DataType::Date, Operator::Eq, "2026-03-14");
        // Timezone/sub-day noise in the stored value must not matter.
        assert_eq!(
            eval(&json!({"postedOn": "2026-03-14T23:59:59+00:00"}), &condition),
            ConditionOutcome::Pass
        );
        assert_eq!(
            eval(&json!({"postedOn": "2026-03-15"}), &condition),
            ConditionOutcome::Fail
        );
    }

    #[test]
    fn test_datetime_truncates_to_seconds() {
        let condition = FeatureCondition::literal(
            "createdAt",
            DataType::DateTime,
            Operator::Eq,
            "2026-03-14T10:30:00Z",
        );
        assert_eq!(
            eval(&json!({"createdAt": "2026-03-14T10:30:00.987Z"}), &condition),
            ConditionOutcome::Pass
        );
        assert_eq!(
            eval(&json!({"createdAt": "2026-03-14T10:30:01Z"}), &condition),
            ConditionOutcome::Fail
        );
    }

    #[test]
    fn test_id_tolerates_representation_drift() {
        let condition =
            FeatureCondition::literal("ownerId", DataType::Id, Operator::Eq, "42");
        // Number 42 stringifies to "42".
        assert_eq!(eval(&json!({"ownerId": 42}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"ownerId": "42"}), &condition), ConditionOutcome::Pass);
    }

    #[test]
    fn test_missing_field_skips_by_default() {
        let condition = FeatureCondition::literal("dept", DataType::String, Operator::Eq, "sales");
        assert_eq!(eval(&json!({}), &condition), ConditionOutcome::Skip);
    }

    #[test]
    fn test_missing_field_policy_fail() {
        let condition = FeatureCondition::literal("dept", DataType::String, Operator::Eq, "sales");
        let record = json!({});
        let field = field_values(&record, "dept");
        let outcome = evaluate_condition(
            &field,
            &condition,
            &condition.operands.values(),
            MissingFieldPolicy::Fail,
        );
        assert_eq!(outcome, ConditionOutcome::Fail);
    }

    #[test]
    fn test_in_operator_set_intersection() {
        let condition = FeatureCondition::literal(
            "status",
            DataType::String,
            Operator::In,
            "draft,pending",
        );
        assert_eq!(eval(&json!({"status": "pending"}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"status": "posted"}), &condition), ConditionOutcome::Fail);
    }

    #[test]
    fn test_not_in_is_set_complement_not_existential() {
        let condition =
            FeatureCondition::literal("tags", DataType::String, Operator::NotIn, "banned");
        assert_eq!(eval(&json!({"tags": ["ok", "fine"]}), &condition), ConditionOutcome::Pass);
        // Any overlap fails the whole condition.
        assert_eq!(eval(&json!({"tags": ["ok", "banned"]}), &condition), ConditionOutcome::Fail);
    }

    #[test]
    fn test_exists_intersects_list_field() {
        let condition = FeatureCondition::literal(
            "roleIds",
            DataType::Id,
            Operator::Exists,
            "r1,r9",
        );
        assert_eq!(eval(&json!({"roleIds": ["r3", "r9"]}), &condition), ConditionOutcome::Pass);
        assert_eq!(eval(&json!({"roleIds": ["r3"]}), &condition), ConditionOutcome::Fail);
        // An empty array is present but intersects nothing: fail, not skip.
        assert_eq!(eval(&json!({"roleIds": []}), &condition), ConditionOutcome::Fail);
    }

    #[test]
    fn test_nested_array_existential_semantics() {
        let condition =
            FeatureCondition::literal("lines.sku", DataType::String, Operator::Eq, "widget");
        assert_eq!(
            eval(&json!({"lines": [{"sku": "bolt"}, {"sku": "widget"}]}), &condition),
            ConditionOutcome::Pass
        );
        assert_eq!(
            eval(&json!({"lines": [{"sku": "bolt"}]}), &condition),
            ConditionOutcome::Fail
        );
    }

    #[test]
    fn test_check_record_permission_empty_conditions_pass() {
        let features = FeatureSet::new();
        assert!(check_record_permission(
            &json!({"anything": 1}),
            &features,
            &[],
            MissingFieldPolicy::Skip
        ));
    }

    #[test]
    fn test_check_record_permission_mixed_skip_and_pass() {
        let features = FeatureSet::new();
        let conditions = vec![
            FeatureCondition::literal("status", DataType::String, Operator::Eq, "draft"),
            FeatureCondition::literal("absent", DataType::String, Operator::Eq, "x"),
        ];
        // Present-and-passing AND absent-skipped => true.
        assert!(check_record_permission(
            &json!({"status": "draft"}),
            &features,
            &conditions,
            MissingFieldPolicy::Skip
        ));
        // Present-and-failing => false regardless of the skip.
        assert!(!check_record_permission(
            &json!({"status": "posted"}),
            &features,
            &conditions,
            MissingFieldPolicy::Skip
        ));
    }

    #[test]
    fn test_check_record_permission_principal_operand() {
        let features = FeatureSet::new().with("USER_ID", vec!["u7".to_string()]);
        let condition = FeatureCondition::principal_feature(
            "ownerId",
            DataType::Id,
            Operator::Eq,
            "USER_ID",
        );
        assert!(check_record_permission(
            &json!({"ownerId": "u7"}),
            &features,
            std::slice::from_ref(&condition),
            MissingFieldPolicy::Skip
        ));
        assert!(!check_record_permission(
            &json!({"ownerId": "u8"}),
            &features,
            std::slice::from_ref(&condition),
            MissingFieldPolicy::Skip
        ));
    }

    #[test]
    fn test_check_record_permission_unresolved_principal_feature_denies() {
        let features = FeatureSet::new(); // no USER_ID feature
        let condition = FeatureCondition::principal_feature(
            "ownerId",
            DataType::Id,
            Operator::Eq,
            "USER_ID",
        );
        assert!(!check_record_permission(
            &json!({"ownerId": "u7"}),
            &features,
            &[condition],
            MissingFieldPolicy::Skip
        ));
    }

    proptest! {
        /// Evaluation is deterministic: the same (record, condition) pair
        /// yields the same outcome on repeated evaluation.
        #[test]
        fn prop_evaluation_is_idempotent(amount in -1_000_000i64..1_000_000, bound in -1_000_000i64..1_000_000) {
            let condition = FeatureCondition::literal(
                "amount",
                DataType::Number,
                Operator::Gte,
                bound.to_string().as_str(),
            );
            let record = json!({ "amount": amount });
            let first = eval(&record, &condition);
            let second = eval(&record, &condition);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first == ConditionOutcome::Pass, amount >= bound);
        }

        /// NE is the complement of EQ for present scalar fields.
        #[test]
        fn prop_ne_complements_eq(value in "[a-z]{1,8}", operand in "[a-z]{1,8}") {
            let record = json!({ "f": value });
            let eq = FeatureCondition::literal("f", DataType::String, Operator::Eq, operand.as_str());
            let ne = FeatureCondition::literal("f", DataType::String, Operator::Ne, operand.as_str());
            prop_assert_ne!(eval(&record, &eq), eval(&record, &ne));
        }
    }
}
