//! Grants and the grant repository.
//!
//! A [`Grant`] is the materialization of one policy against one principal,
//! produced by the policy matcher. Grants are derived data: the repository
//! recomputes a principal's full grant set whenever that principal's
//! features or any source policy changes, and is never edited entry by
//! entry.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::condition::{FeatureCondition, MissingFieldPolicy, check_record_permission};
use crate::feature::FeatureSet;
use crate::policy::{Policy, match_policy_to_principal};
use quillon_types::{ActionCode, PrincipalId};

// ============================================================================
// Grant
// ============================================================================

/// A principal-bound permission, derived from a [`Policy`].
///
/// Carries the source policy's record/api-param conditions and field
/// allow-lists, plus the principal's feature snapshot — needed later to
/// resolve principal-feature operands against record data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub principal: PrincipalId,
    pub function_id: Option<String>,
    pub resource_code: String,
    pub action_code: ActionCode,
    pub context: String,
    pub record_conditions: Vec<FeatureCondition>,
    pub api_param_conditions: Vec<FeatureCondition>,
    pub allowed_request_fields: Vec<String>,
    pub allowed_response_fields: Vec<String>,
    /// Feature snapshot taken at materialization time.
    pub features: FeatureSet,
}

impl Grant {
    /// A grant with zero record conditions authorizes every record of the
    /// resource.
    pub fn is_unconditional(&self) -> bool {
        self.record_conditions.is_empty()
    }

    /// Whether this grant covers `(resource, action, context)`.
    ///
    /// A grant with an empty context is global; otherwise the contexts must
    /// match exactly.
    pub fn covers(&self, resource: &str, action: ActionCode, context: &str) -> bool {
        self.resource_code == resource
            && self.action_code == action
            && (self.context.is_empty() || self.context == context)
    }

    /// Evaluates the grant's record conditions against a record.
    pub fn permits_record(&self, record: &Value, missing_field: MissingFieldPolicy) -> bool {
        check_record_permission(record, &self.features, &self.record_conditions, missing_field)
    }

    /// Evaluates the grant's api-param conditions against the request
    /// parameters.
    pub fn permits_params(&self, params: &Value, missing_field: MissingFieldPolicy) -> bool {
        check_record_permission(
            params,
            &self.features,
            &self.api_param_conditions,
            missing_field,
        )
    }
}

// ============================================================================
// GrantRepository
// ============================================================================

/// Holds every principal's materialized grants.
///
/// Constructed once at startup and passed by reference; there is no ambient
/// global state. Reads are safe under arbitrary concurrency. Rebuilding a
/// principal's grants is delete-then-reinsert under a single write guard, so
/// a concurrent reader observes either the old set or the new set, never a
/// partially-updated one.
#[derive(Debug)]
pub struct GrantRepository {
    inner: RwLock<HashMap<PrincipalId, Vec<Grant>>>,
    missing_field_policy: MissingFieldPolicy,
    audit_enabled: bool,
}

impl Default for GrantRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl GrantRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            missing_field_policy: MissingFieldPolicy::Skip,
            audit_enabled: true,
        }
    }

    /// Disables audit logging (for tests).
    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }

    /// Overrides the missing-record-field policy for record and api-param
    /// condition evaluation.
    pub fn with_missing_field_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_field_policy = policy;
        self
    }

    /// Returns the configured missing-field policy.
    pub fn missing_field_policy(&self) -> MissingFieldPolicy {
        self.missing_field_policy
    }

    /// Rematerializes every grant for one principal from the current
    /// policies and feature snapshot.
    ///
    /// Called whenever the principal's features or any source policy
    /// changes. The grant set is replaced atomically; grants are stored in
    /// policy order, which is the order the point-check consults them in.
    pub fn rebuild_for_principal(
        &self,
        principal: &PrincipalId,
        policies: &[Policy],
        features: &FeatureSet,
    ) {
        let grants: Vec<Grant> = policies
            .iter()
            .filter_map(|policy| match_policy_to_principal(policy, principal, features))
            .collect();

        if self.audit_enabled {
            info!(
                principal = %principal,
                grant_count = grants.len(),
                "rebuilt grants for principal"
            );
        }

        let mut guard = self.inner.write().expect("grant repository lock poisoned");
        guard.remove(principal);
        guard.insert(principal.clone(), grants);
    }

    /// Drops every grant for one principal (principal deleted, or pending a
    /// rebuild).
    pub fn invalidate_principal(&self, principal: &PrincipalId) {
        let mut guard = self.inner.write().expect("grant repository lock poisoned");
        guard.remove(principal);
    }

    /// Returns the grants covering `(principal, resource, action, context)`,
    /// in insertion order.
    ///
    /// Grants with an empty stored context match any requested context;
    /// otherwise the contexts must match exactly.
    pub fn grants_for(
        &self,
        principal: &PrincipalId,
        resource: &str,
        action: ActionCode,
        context: &str,
    ) -> Vec<Grant> {
        let guard = self.inner.read().expect("grant repository lock poisoned");
        guard
            .get(principal)
            .map(|grants| {
                grants
                    .iter()
                    .filter(|g| g.covers(resource, action, context))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Point-check mode: returns the first grant (insertion order) whose
    /// record conditions all pass against `record` and whose api-param
    /// conditions all pass against `params`.
    ///
    /// Iteration order is observably significant — different grants may
    /// carry different field allow-lists — and is defined as the order the
    /// grants were materialized in (source policy order). Returns `None`
    /// when no grant matches; the caller must treat that as FORBIDDEN.
    pub fn authorize_record(
        &self,
        principal: &PrincipalId,
        resource: &str,
        action: ActionCode,
        context: &str,
        record: &Value,
        params: &Value,
    ) -> Option<Grant> {
        let candidates = self.grants_for(principal, resource, action, context);
        let matched = candidates.into_iter().find(|grant| {
            grant.permits_record(record, self.missing_field_policy)
                && grant.permits_params(params, self.missing_field_policy)
        });

        if self.audit_enabled {
            match &matched {
                Some(_) => info!(
                    principal = %principal,
                    resource = %resource,
                    action = %action,
                    "record access granted"
                ),
                None => warn!(
                    principal = %principal,
                    resource = %resource,
                    action = %action,
                    "record access denied: no matching grant"
                ),
            }
        }

        matched
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{DataType, Operator};
    use serde_json::json;

    fn alice() -> PrincipalId {
        PrincipalId::new("alice")
    }

    fn alice_features() -> FeatureSet {
        FeatureSet::new()
            .with("ROLE_LIST", vec!["accountant".into()])
            .with("USER_ID", vec!["alice".into()])
    }

    fn owner_policy(action: ActionCode) -> Policy {
        Policy::new("v1/invoices", action)
            .with_record_condition(FeatureCondition::principal_feature(
                "ownerId",
                DataType::Id,
                Operator::Eq,
                "USER_ID",
            ))
            .allow_all_fields()
    }

    fn repo_with(policies: &[Policy]) -> GrantRepository {
        let repo = GrantRepository::new().without_audit();
        repo.rebuild_for_principal(&alice(), policies, &alice_features());
        repo
    }

    #[test]
    fn test_unconditional_grant_authorizes_any_record() {
        let repo = repo_with(&[Policy::new("v1/invoices", ActionCode::GetById).allow_all_fields()]);
        for record in [json!({}), json!({"ownerId": "someone-else"}), json!({"x": 1})] {
            assert!(
                repo.authorize_record(
                    &alice(),
                    "v1/invoices",
                    ActionCode::GetById,
                    "",
                    &record,
                    &json!({}),
                )
                .is_some()
            );
        }
    }

    #[test]
    fn test_owner_scoped_point_check() {
        let repo = repo_with(&[owner_policy(ActionCode::UpdateById)]);

        assert!(
            repo.authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::UpdateById,
                "",
                &json!({"ownerId": "alice"}),
                &json!({}),
            )
            .is_some()
        );
        assert!(
            repo.authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::UpdateById,
                "",
                &json!({"ownerId": "bob"}),
                &json!({}),
            )
            .is_none()
        );
    }

    #[test]
    fn test_first_matching_grant_wins_in_insertion_order() {
        let narrow = Policy::new("v1/invoices", ActionCode::GetById)
            .allow_response_field("amount");
        let wide = Policy::new("v1/invoices", ActionCode::GetById).allow_all_fields();
        let repo = repo_with(&[narrow, wide]);

        let grant = repo
            .authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::GetById,
                "",
                &json!({}),
                &json!({}),
            )
            .unwrap();
        // The first policy's grant is consulted first.
        assert_eq!(grant.allowed_response_fields, vec!["amount".to_string()]);
    }

    #[test]
    fn test_context_scoping() {
        let global = Policy::new("v1/invoices", ActionCode::GetList).allow_all_fields();
        let scoped = Policy::new("v1/invoices", ActionCode::GetList)
            .with_context("archive")
            .allow_all_fields();
        let repo = repo_with(&[scoped, global]);

        // Global grant matches any context; scoped grant only its own.
        assert_eq!(
            repo.grants_for(&alice(), "v1/invoices", ActionCode::GetList, "archive").len(),
            2
        );
        assert_eq!(
            repo.grants_for(&alice(), "v1/invoices", ActionCode::GetList, "drafts").len(),
            1
        );
    }

    #[test]
    fn test_api_param_conditions_gate_the_grant() {
        let policy = Policy::new("v1/invoices", ActionCode::TriggerWorkflowById)
            .with_api_param_condition(FeatureCondition::literal(
                "workflowActionCode",
                DataType::String,
                Operator::In,
                "submit,recall",
            ))
            .allow_all_fields();
        let repo = repo_with(&[policy]);

        assert!(
            repo.authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::TriggerWorkflowById,
                "",
                &json!({}),
                &json!({"workflowActionCode": "submit"}),
            )
            .is_some()
        );
        assert!(
            repo.authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::TriggerWorkflowById,
                "",
                &json!({}),
                &json!({"workflowActionCode": "approve"}),
            )
            .is_none()
        );
    }

    #[test]
    fn test_rebuild_replaces_grant_set() {
        let repo = repo_with(&[owner_policy(ActionCode::GetById)]);
        assert_eq!(repo.grants_for(&alice(), "v1/invoices", ActionCode::GetById, "").len(), 1);

        // Policy change: rebuild with an empty policy list.
        repo.rebuild_for_principal(&alice(), &[], &alice_features());
        assert!(repo.grants_for(&alice(), "v1/invoices", ActionCode::GetById, "").is_empty());
    }

    #[test]
    fn test_invalidate_principal() {
        let repo = repo_with(&[owner_policy(ActionCode::GetById)]);
        repo.invalidate_principal(&alice());
        assert!(
            repo.authorize_record(
                &alice(),
                "v1/invoices",
                ActionCode::GetById,
                "",
                &json!({"ownerId": "alice"}),
                &json!({}),
            )
            .is_none()
        );
    }

    #[test]
    fn test_non_matching_principal_policy_produces_no_grant() {
        let manager_only = Policy::new("v1/invoices", ActionCode::DeleteById)
            .with_principal_condition(FeatureCondition::literal(
                "ROLE_LIST",
                DataType::Id,
                Operator::In,
                "manager",
            ));
        let repo = repo_with(&[manager_only]);
        assert!(repo.grants_for(&alice(), "v1/invoices", ActionCode::DeleteById, "").is_empty());
    }
}
