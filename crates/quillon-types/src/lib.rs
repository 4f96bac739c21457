//! # quillon-types: Core types for `Quillon`
//!
//! Shared types used across the Quillon access-control engine:
//! - Principal identity ([`PrincipalId`])
//! - The closed set of CRUD action codes ([`ActionCode`])
//! - Record field access over JSON documents ([`field_values`], [`FieldRef`])
//!
//! Records handled by the engine are schema-driven JSON documents
//! (`serde_json::Value`); this crate provides the dot-path field lookup the
//! predicate evaluator builds on, including the one-level array fan-out used
//! for sub-document conditions.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// PrincipalId
// ============================================================================

/// Unique identifier for a principal (the authenticated actor).
///
/// Stored as a string so that both numeric user ids and document-store
/// object ids round-trip without loss.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// ActionCode
// ============================================================================

/// The closed set of actions a policy can authorize.
///
/// Serde representation matches the camelCase tokens stored in policy
/// documents (`"getList"`, `"triggerWorkflowById"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionCode {
    #[serde(rename = "getList")]
    GetList,
    #[serde(rename = "getById")]
    GetById,
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "updateById")]
    UpdateById,
    #[serde(rename = "deleteById")]
    DeleteById,
    #[serde(rename = "print")]
    Print,
    #[serde(rename = "exportList")]
    ExportList,
    #[serde(rename = "aggregate")]
    Aggregate,
    #[serde(rename = "triggerWorkflowById")]
    TriggerWorkflowById,
}

impl ActionCode {
    /// Every configured action code, in probe order.
    ///
    /// Used by the gatekeeper's follow-on-action probe to report which
    /// actions the UI should enable for a loaded record.
    pub const ALL: [ActionCode; 9] = [
        ActionCode::GetList,
        ActionCode::GetById,
        ActionCode::Create,
        ActionCode::UpdateById,
        ActionCode::DeleteById,
        ActionCode::Print,
        ActionCode::ExportList,
        ActionCode::Aggregate,
        ActionCode::TriggerWorkflowById,
    ];

    /// Returns the wire token for this action (the stored-policy spelling).
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCode::GetList => "getList",
            ActionCode::GetById => "getById",
            ActionCode::Create => "create",
            ActionCode::UpdateById => "updateById",
            ActionCode::DeleteById => "deleteById",
            ActionCode::Print => "print",
            ActionCode::ExportList => "exportList",
            ActionCode::Aggregate => "aggregate",
            ActionCode::TriggerWorkflowById => "triggerWorkflowById",
        }
    }
}

impl Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Record field access
// ============================================================================

/// A field value found on a record.
///
/// `Missing` is distinct from JSON `null`: a condition on a missing field is
/// skipped by the evaluator, while an explicit `null` is a present value that
/// participates in the comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef<'a> {
    /// The field is absent from the record.
    Missing,
    /// A single value at the path.
    One(&'a Value),
    /// The path crossed an array: all values found across elements.
    Many(Vec<&'a Value>),
}

impl FieldRef<'_> {
    /// Returns whether the field is absent.
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldRef::Missing)
    }

    /// Flattens to a list of candidate values (empty for `Missing`).
    pub fn values(&self) -> Vec<&Value> {
        match self {
            FieldRef::Missing => Vec::new(),
            FieldRef::One(v) => vec![v],
            FieldRef::Many(vs) => vs.clone(),
        }
    }
}

/// Looks up a dot-path field on a JSON record.
///
/// Supports one level of sub-document array fan-out: for `"items.status"`
/// with `items` an array, returns the `status` of every element that carries
/// one. A top-level array value (e.g. a list of tag strings) is returned as
/// `Many` so that set operators see every element.
pub fn field_values<'a>(record: &'a Value, path: &str) -> FieldRef<'a> {
    let mut segments = path.splitn(2, '.');
    let head = segments.next().unwrap_or(path);
    let rest = segments.next();

    let Some(value) = record.get(head) else {
        return FieldRef::Missing;
    };

    match (value, rest) {
        (Value::Array(items), Some(tail)) => {
            let found: Vec<&Value> = items.iter().filter_map(|item| item.get(tail)).collect();
            if found.is_empty() {
                // Elements exist but none carry the field (or the array is
                // empty): the nested field is absent from the record.
                FieldRef::Missing
            } else {
                FieldRef::Many(found)
            }
        }
        (nested, Some(tail)) => match nested.get(tail) {
            Some(v) => FieldRef::One(v),
            None => FieldRef::Missing,
        },
        (Value::Array(items), None) => FieldRef::Many(items.iter().collect()),
        (v, None) => FieldRef::One(v),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_principal_id_display_and_serde() {
        let id = PrincipalId::new("64a1f2");
        assert_eq!(id.to_string(), "64a1f2");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"64a1f2\"");
        let back: PrincipalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test_case(ActionCode::GetList, "getList")]
    #[test_case(ActionCode::TriggerWorkflowById, "triggerWorkflowById")]
    #[test_case(ActionCode::DeleteById, "deleteById")]
    fn test_action_code_wire_token(action: ActionCode, token: &str) {
        assert_eq!(action.as_str(), token);
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, format!("\"{token}\""));
        let back: ActionCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_field_values_simple() {
        let record = json!({"ownerId": "u1", "amount": 12});
        assert_eq!(
            field_values(&record, "ownerId"),
            FieldRef::One(&json!("u1"))
        );
        assert!(field_values(&record, "missing").is_missing());
    }

    #[test]
    fn test_field_values_null_is_present() {
        let record = json!({"dueDate": null});
        let found = field_values(&record, "dueDate");
        assert!(!found.is_missing());
        assert_eq!(found.values(), vec![&Value::Null]);
    }

    #[test]
    fn test_field_values_nested_object() {
        let record = json!({"owner": {"id": "u1"}});
        assert_eq!(
            field_values(&record, "owner.id"),
            FieldRef::One(&json!("u1"))
        );
        assert!(field_values(&record, "owner.name").is_missing());
    }

    #[test]
    fn test_field_values_array_fan_out() {
        let record = json!({"lines": [{"sku": "a"}, {"sku": "b"}, {"qty": 2}]});
        let found = field_values(&record, "lines.sku");
        assert_eq!(found.values(), vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_field_values_empty_array_nested_is_missing() {
        let record = json!({"lines": []});
        assert!(field_values(&record, "lines.sku").is_missing());
    }

    #[test]
    fn test_field_values_top_level_array() {
        let record = json!({"tags": ["red", "blue"]});
        let found = field_values(&record, "tags");
        assert_eq!(found.values(), vec![&json!("red"), &json!("blue")]);
    }
}
