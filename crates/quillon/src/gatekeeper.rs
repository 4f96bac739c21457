//! The CRUD gatekeeper.
//!
//! Front door for every authorization question the CRUD layer asks:
//! "may this principal run this action on this resource", "which records may
//! a list request return", "which fields may they send and read back", and
//! "which follow-on actions should the UI enable". All decisions flow
//! through the grant repository; the only exception is the explicit
//! admin-bypass flag, which short-circuits grant checks (but never the
//! workflow state machine) and is always audited.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use quillon_abac::{
    ALL_FIELDS, Conjunction, FeatureStore, FilterExpression, Grant, GrantRepository,
    check_field_permission, compile_search_filter,
};
use quillon_types::{ActionCode, PrincipalId};
use quillon_workflow::{TransitionOutcome, Workflow, WorkflowEngine};

use crate::error::{AccessError, Result};
use crate::store::PolicyStore;

// ============================================================================
// Request context
// ============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    pub principal: PrincipalId,
    /// Explicit bypass flag set by the authentication layer for platform
    /// administrators. Never inferred from features.
    pub is_admin: bool,
    /// Requested context sub-scope (empty for the default context).
    pub context: String,
}

impl PrincipalContext {
    pub fn new(principal: impl Into<PrincipalId>) -> Self {
        Self {
            principal: principal.into(),
            is_admin: false,
            context: String::new(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

// ============================================================================
// Decision results
// ============================================================================

/// Result of a list-shaped permission resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPermission {
    /// Admin bypass: no row scoping, no field restrictions.
    pub unrestricted: bool,
    /// Grants covering the request, in materialization order.
    pub grants: Vec<Grant>,
}

impl QueryPermission {
    /// Compiles the row-scope filter for this permission, ANDing in the
    /// caller's own search terms.
    pub fn compile_filter(&self, base: &Conjunction) -> FilterExpression {
        if self.unrestricted {
            return FilterExpression {
                branches: vec![base.clone()],
            };
        }
        compile_search_filter(&self.grants, base)
    }
}

/// Result of a record-shaped permission resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPermission {
    pub allowed_request_fields: Vec<String>,
    pub allowed_response_fields: Vec<String>,
}

impl RecordPermission {
    fn unrestricted() -> Self {
        Self {
            allowed_request_fields: vec![ALL_FIELDS.to_string()],
            allowed_response_fields: vec![ALL_FIELDS.to_string()],
        }
    }

    fn from_grant(grant: &Grant) -> Self {
        Self {
            allowed_request_fields: grant.allowed_request_fields.clone(),
            allowed_response_fields: grant.allowed_response_fields.clone(),
        }
    }
}

// ============================================================================
// Gatekeeper
// ============================================================================

/// The engine façade wired together at startup.
///
/// Holds the feature store, the policy store, the grant repository, and the
/// workflow engine (which shares the repository). All state is behind `Arc`
/// so one gatekeeper serves concurrent requests.
pub struct Gatekeeper {
    features: Arc<dyn FeatureStore>,
    policies: Arc<dyn PolicyStore>,
    grants: Arc<GrantRepository>,
    workflows: WorkflowEngine,
    audit_enabled: bool,
}

impl Gatekeeper {
    pub fn new(
        features: Arc<dyn FeatureStore>,
        policies: Arc<dyn PolicyStore>,
        grants: Arc<GrantRepository>,
    ) -> Self {
        let workflows = WorkflowEngine::new(Arc::clone(&grants));
        Self {
            features,
            policies,
            grants,
            workflows,
            audit_enabled: true,
        }
    }

    /// Disables audit logging (for tests).
    pub fn without_audit(mut self) -> Self {
        self.workflows = self.workflows.without_audit();
        self.audit_enabled = false;
        self
    }

    /// Registers a workflow definition, validating it first.
    pub fn register_workflow(&mut self, workflow: Workflow) -> Result<()> {
        self.workflows.register(workflow)?;
        Ok(())
    }

    /// Direct access to the workflow engine (state queries such as
    /// [`WorkflowEngine::can_transition`]).
    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    // ------------------------------------------------------------------------
    // Grant lifecycle
    // ------------------------------------------------------------------------

    /// Rematerializes a principal's grants from the current policies and
    /// their feature snapshot.
    ///
    /// Call after the principal's features change or after a policy reload.
    /// A principal unknown to the feature store loses all grants.
    pub fn refresh_principal(&self, principal: &PrincipalId) {
        match self.features.features_for(principal) {
            Some(features) => {
                self.grants
                    .rebuild_for_principal(principal, &self.policies.policies(), &features);
            }
            None => {
                if self.audit_enabled {
                    warn!(principal = %principal, "principal unknown to feature store; grants dropped");
                }
                self.grants.invalidate_principal(principal);
            }
        }
    }

    // ------------------------------------------------------------------------
    // List-shaped requests
    // ------------------------------------------------------------------------

    /// Resolves permission for a list-shaped request (`getList`,
    /// `exportList`, `aggregate`).
    ///
    /// Returns the covering grants whose response allow-list admits the
    /// requested fields; the caller compiles them into a row-scope filter
    /// via [`QueryPermission::compile_filter`]. Fails with `Forbidden` when
    /// no grant covers the request.
    pub fn resolve_query_permission(
        &self,
        ctx: &PrincipalContext,
        resource: &str,
        action: ActionCode,
        requested_fields: &[String],
    ) -> Result<QueryPermission> {
        if resource.is_empty() {
            return Err(AccessError::invalid_argument("empty resource code"));
        }
        if ctx.is_admin {
            Self::audit_admin_bypass(ctx, resource, action);
            return Ok(QueryPermission {
                unrestricted: true,
                grants: Vec::new(),
            });
        }

        let grants: Vec<Grant> = self
            .grants
            .grants_for(&ctx.principal, resource, action, &ctx.context)
            .into_iter()
            .filter(|grant| check_field_permission(requested_fields, &grant.allowed_response_fields))
            .collect();

        if grants.is_empty() {
            return Err(Self::forbidden(ctx, resource, action));
        }
        Ok(QueryPermission {
            unrestricted: false,
            grants,
        })
    }

    // ------------------------------------------------------------------------
    // Record-shaped requests
    // ------------------------------------------------------------------------

    /// Resolves permission for a record-shaped request (`getById`, `create`,
    /// `updateById`, `deleteById`, `print`, ...).
    ///
    /// Point-checks the record against the principal's grants in
    /// materialization order; the first grant whose record and api-param
    /// conditions pass decides the field allow-lists. The requested field
    /// lists must then clear those allow-lists or the request is denied.
    /// For `create` there is no record yet: pass an empty object, and record
    /// conditions on absent fields are skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_record_permission(
        &self,
        ctx: &PrincipalContext,
        resource: &str,
        action: ActionCode,
        record: &Value,
        params: &Value,
        requested_request_fields: &[String],
        requested_response_fields: &[String],
    ) -> Result<RecordPermission> {
        if resource.is_empty() {
            return Err(AccessError::invalid_argument("empty resource code"));
        }
        if ctx.is_admin {
            Self::audit_admin_bypass(ctx, resource, action);
            return Ok(RecordPermission::unrestricted());
        }

        let Some(grant) = self.grants.authorize_record(
            &ctx.principal,
            resource,
            action,
            &ctx.context,
            record,
            params,
        ) else {
            return Err(Self::forbidden(ctx, resource, action));
        };

        if !check_field_permission(requested_request_fields, &grant.allowed_request_fields)
            || !check_field_permission(requested_response_fields, &grant.allowed_response_fields)
        {
            if self.audit_enabled {
                warn!(
                    principal = %ctx.principal,
                    resource = %resource,
                    action = %action,
                    "request denied: fields outside grant allow-list"
                );
            }
            return Err(Self::forbidden(ctx, resource, action));
        }

        Ok(RecordPermission::from_grant(&grant))
    }

    /// Reports which actions the principal may run against a loaded record,
    /// for UI affordances.
    ///
    /// Each action is probed independently with no requested fields and
    /// empty api-params; a deny on one action never affects the others.
    pub fn probe_actions(
        &self,
        ctx: &PrincipalContext,
        resource: &str,
        record: &Value,
    ) -> Vec<ActionCode> {
        ActionCode::ALL
            .into_iter()
            .filter(|&action| {
                self.resolve_record_permission(ctx, resource, action, record, &json!({}), &[], &[])
                    .is_ok()
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Workflow transitions
    // ------------------------------------------------------------------------

    /// Whether the state machine admits `action` from the record's current
    /// state. Pure state-graph question; grants are not consulted.
    pub fn can_trigger_workflow(
        &self,
        workflow_code: &str,
        record: &Value,
        action: &str,
    ) -> Result<bool> {
        Ok(self.workflows.can_transition(workflow_code, record, action)?)
    }

    /// Applies a workflow transition to `record`.
    ///
    /// Non-admin principals are authorized through their
    /// `triggerWorkflowById` grants, whose api-param conditions see the
    /// workflow action code. The admin bypass skips the grant check but the
    /// state machine still applies: an undefined edge fails the same way
    /// for everyone.
    pub fn apply_transition(
        &self,
        ctx: &PrincipalContext,
        workflow_code: &str,
        resource: &str,
        record: &mut Value,
        action: &str,
    ) -> Result<TransitionOutcome> {
        let outcome = if ctx.is_admin {
            Self::audit_admin_bypass(ctx, resource, ActionCode::TriggerWorkflowById);
            self.workflows.apply_transition_preauthorized(
                workflow_code,
                &ctx.principal,
                resource,
                &ctx.context,
                record,
                action,
            )?
        } else {
            self.workflows.apply_transition(
                workflow_code,
                &ctx.principal,
                resource,
                &ctx.context,
                record,
                action,
            )?
        };
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn forbidden(ctx: &PrincipalContext, resource: &str, action: ActionCode) -> AccessError {
        AccessError::Forbidden {
            principal: ctx.principal.clone(),
            resource: resource.to_string(),
            action,
        }
    }

    /// Admin bypasses are always written to the audit log, even when other
    /// audit output is disabled.
    fn audit_admin_bypass(ctx: &PrincipalContext, resource: &str, action: ActionCode) {
        info!(
            principal = %ctx.principal,
            resource = %resource,
            action = %action,
            "admin bypass"
        );
    }
}
