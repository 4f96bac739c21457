//! Policies and the policy matcher.
//!
//! A [`Policy`] is the declarative permission template the platform stores
//! per function/resource/action. The matcher evaluates a policy's principal
//! conditions against one principal's feature snapshot and, on success,
//! materializes a principal-bound [`Grant`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::condition::{
    ConditionError, FeatureCondition, Operator, string_sets_intersect,
};
use crate::feature::FeatureSet;
use crate::grant::Grant;
use quillon_types::{ActionCode, PrincipalId};

/// Error type for policy validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// A condition on the policy is malformed.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Principal conditions support only membership operators.
    #[error(
        "principal condition on feature '{feature}' uses {operator}; only EQ/NE/IN/NOT_IN apply to principal matching"
    )]
    UnsupportedPrincipalOperator { feature: String, operator: Operator },

    /// The policy does not name a resource.
    #[error("policy has an empty resource code")]
    EmptyResourceCode,
}

/// Sentinel entry in a field allow-list that grants every field.
pub const ALL_FIELDS: &str = "*";

// ============================================================================
// Policy
// ============================================================================

/// Declarative permission template.
///
/// Serde field names match the stored policy documents of the surrounding
/// platform. A policy with zero record conditions authorizes all records of
/// the resource (unconditional grant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Feature/screen identifier this policy belongs to.
    #[serde(rename = "functionId", default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,

    /// Logical resource, e.g. `"v1/invoices"`.
    #[serde(rename = "resourceCode")]
    pub resource_code: String,

    /// The action this policy authorizes.
    #[serde(rename = "actionCode")]
    pub action_code: ActionCode,

    /// Optional sub-scope. Empty means global: the grant applies to every
    /// requested context.
    #[serde(default)]
    pub context: String,

    /// Who this policy applies to. Evaluated once per principal, at grant
    /// materialization time.
    #[serde(rename = "principalFeatureConditions", default)]
    pub principal_conditions: Vec<FeatureCondition>,

    /// Which records this policy authorizes. Evaluated per record, lazily,
    /// at request time.
    #[serde(rename = "recordFeatureConditions", default)]
    pub record_conditions: Vec<FeatureCondition>,

    /// Constraints on request parameters (e.g. workflow transition codes).
    #[serde(rename = "apiParamFeatureConditions", default)]
    pub api_param_conditions: Vec<FeatureCondition>,

    /// Fields the caller may send. `["*"]` grants all fields; an empty list
    /// grants none.
    #[serde(rename = "allowedRequestFieldList", default)]
    pub allowed_request_fields: Vec<String>,

    /// Fields the caller may read back. Same sentinel semantics.
    #[serde(rename = "allowedResponseFieldList", default)]
    pub allowed_response_fields: Vec<String>,
}

impl Policy {
    /// Creates a policy for `(resource, action)` with no conditions and no
    /// allowed fields.
    pub fn new(resource_code: impl Into<String>, action_code: ActionCode) -> Self {
        Self {
            function_id: None,
            resource_code: resource_code.into(),
            action_code,
            context: String::new(),
            principal_conditions: Vec::new(),
            record_conditions: Vec::new(),
            api_param_conditions: Vec::new(),
            allowed_request_fields: Vec::new(),
            allowed_response_fields: Vec::new(),
        }
    }

    /// Sets the owning function id.
    pub fn with_function(mut self, function_id: impl Into<String>) -> Self {
        self.function_id = Some(function_id.into());
        self
    }

    /// Sets the context sub-scope.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Adds a principal-matching condition.
    pub fn with_principal_condition(mut self, condition: FeatureCondition) -> Self {
        self.principal_conditions.push(condition);
        self
    }

    /// Adds a record-authorization condition.
    pub fn with_record_condition(mut self, condition: FeatureCondition) -> Self {
        self.record_conditions.push(condition);
        self
    }

    /// Adds a request-parameter condition.
    pub fn with_api_param_condition(mut self, condition: FeatureCondition) -> Self {
        self.api_param_conditions.push(condition);
        self
    }

    /// Allows a request field (or the `"*"` sentinel).
    pub fn allow_request_field(mut self, field: impl Into<String>) -> Self {
        self.allowed_request_fields.push(field.into());
        self
    }

    /// Allows a response field (or the `"*"` sentinel).
    pub fn allow_response_field(mut self, field: impl Into<String>) -> Self {
        self.allowed_response_fields.push(field.into());
        self
    }

    /// Allows every request and response field.
    pub fn allow_all_fields(mut self) -> Self {
        self.allowed_request_fields = vec![ALL_FIELDS.to_string()];
        self.allowed_response_fields = vec![ALL_FIELDS.to_string()];
        self
    }

    /// Validates the policy at load time.
    ///
    /// Rejects malformed conditions and principal conditions whose operator
    /// is not a membership operator. Configuration errors surface here, not
    /// during evaluation.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.resource_code.is_empty() {
            return Err(PolicyError::EmptyResourceCode);
        }
        for condition in self
            .principal_conditions
            .iter()
            .chain(&self.record_conditions)
            .chain(&self.api_param_conditions)
        {
            condition.validate()?;
        }
        for condition in &self.principal_conditions {
            if !matches!(
                condition.operator,
                Operator::Eq | Operator::Ne | Operator::In | Operator::NotIn
            ) {
                return Err(PolicyError::UnsupportedPrincipalOperator {
                    feature: condition.feature_name.clone(),
                    operator: condition.operator,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Field permission
// ============================================================================

/// Checks a requested field list against an allow-list.
///
/// - An empty requested list always passes (the caller asked for the
///   default fields).
/// - An empty allow-list always fails (the policy grants nothing).
/// - The `"*"` sentinel grants every field.
/// - Otherwise the requested fields must be a subset of the allow-list.
pub fn check_field_permission(requested: &[String], allowed: &[String]) -> bool {
    if requested.is_empty() {
        return true;
    }
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|f| f == ALL_FIELDS) {
        return true;
    }
    requested.iter().all(|field| allowed.contains(field))
}

// ============================================================================
// Policy matcher
// ============================================================================

/// Evaluates a policy's principal conditions against one principal and, on
/// success, materializes a [`Grant`].
///
/// Principal matching is deny-by-default on missing data: a condition
/// naming a feature the principal does not hold fails the whole match
/// (unlike record conditions, which skip absent fields). Operators:
/// EQ/NE are exact membership string-compare against the principal's value
/// list; IN/NOT_IN test whether the intersection with the operand list is
/// non-empty/empty.
pub fn match_policy_to_principal(
    policy: &Policy,
    principal: &PrincipalId,
    features: &FeatureSet,
) -> Option<Grant> {
    for condition in &policy.principal_conditions {
        let Some(held) = features.get(&condition.feature_name) else {
            debug!(
                principal = %principal,
                feature = %condition.feature_name,
                "principal lacks feature; policy does not apply"
            );
            return None;
        };
        let operands = condition.resolve_operands(features)?;
        let matched = match condition.operator {
            Operator::Eq => operands
                .first()
                .is_some_and(|op| held.contains(op)),
            Operator::Ne => operands
                .first()
                .is_some_and(|op| !held.contains(op)),
            Operator::In => string_sets_intersect(held, &operands),
            Operator::NotIn => !string_sets_intersect(held, &operands),
            // Rejected by Policy::validate().
            _ => false,
        };
        if !matched {
            return None;
        }
    }

    Some(Grant {
        principal: principal.clone(),
        function_id: policy.function_id.clone(),
        resource_code: policy.resource_code.clone(),
        action_code: policy.action_code,
        context: policy.context.clone(),
        record_conditions: policy.record_conditions.clone(),
        api_param_conditions: policy.api_param_conditions.clone(),
        allowed_request_fields: policy.allowed_request_fields.clone(),
        allowed_response_fields: policy.allowed_response_fields.clone(),
        features: features.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================
