//! Transition execution.
//!
//! The engine owns the registered workflow definitions and drives the
//! apply-transition sequence: re-validate the edge, authorize the principal,
//! mutate the state field, run the side-effect handler (rolling the mutation
//! back if it aborts or fails), then report the outcome with the follow-on
//! actions and deferred notifications.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::definition::{DefinitionError, NotificationDirective, Workflow};
use quillon_abac::GrantRepository;
use quillon_types::{ActionCode, PrincipalId};

/// Error type for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The named workflow is not registered, or its definition is invalid.
    #[error("invalid workflow '{workflow}': {reason}")]
    InvalidWorkflow { workflow: String, reason: String },

    /// The record's current state does not admit the requested action.
    #[error("no transition '{action}' from state '{state}'")]
    InvalidState { state: String, action: String },

    /// No grant authorizes this principal to trigger the transition.
    #[error("principal '{principal}' may not trigger '{action}'")]
    Forbidden { principal: PrincipalId, action: String },

    /// The transition handler aborted or failed; the state mutation was
    /// rolled back.
    #[error("handler for '{action}' failed: {reason}")]
    HandlerFailure { action: String, reason: String },
}

impl From<DefinitionError> for WorkflowError {
    fn from(err: DefinitionError) -> Self {
        let workflow = match &err {
            DefinitionError::EmptyStateField { workflow }
            | DefinitionError::EmptyStartingState { workflow }
            | DefinitionError::DuplicateTransition { workflow, .. } => workflow.clone(),
        };
        WorkflowError::InvalidWorkflow {
            workflow,
            reason: err.to_string(),
        }
    }
}

/// Handler decision: commit the transition or abort it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerVerdict {
    Proceed,
    /// Roll the state mutation back and fail the request.
    Abort { reason: String },
}

/// Request context passed to transition handlers.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub principal: &'a PrincipalId,
    pub resource: &'a str,
    pub context: &'a str,
    pub action: &'a str,
}

/// Side-effect hook invoked after the state field is set, before the
/// transition is reported committed.
///
/// The handler sees the record with the new state already applied (and may
/// mutate other fields) plus a snapshot of the record as it was before the
/// transition. Returning [`HandlerVerdict::Abort`] or an error restores the
/// record to the pre-transition snapshot, discarding the state change and
/// any other handler mutations; either way the error surfaces to the caller
/// as [`WorkflowError::HandlerFailure`].
pub trait TransitionHandler: Send + Sync {
    fn on_transition(
        &self,
        ctx: &TransitionContext<'_>,
        record: &mut Value,
        old_record: &Value,
    ) -> Result<HandlerVerdict, Box<dyn std::error::Error + Send + Sync>>;
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from_state: String,
    pub to_state: String,
    /// Workflow action codes available from the new state (empty when the
    /// new state is terminal and rollback is disabled).
    pub reachable_actions: Vec<String>,
    /// Notifications to deliver after the record write succeeds.
    pub notifications: Vec<NotificationDirective>,
}

// ============================================================================
// WorkflowEngine
// ============================================================================

/// Executes workflow transitions against the grant repository.
///
/// Transitions are authorized as `triggerWorkflowById` requests: the grant's
/// api-param conditions see `{"workflowActionCode": <action>}`, so a policy
/// can limit which transitions a role may trigger.
pub struct WorkflowEngine {
    workflows: HashMap<String, Workflow>,
    grants: Arc<GrantRepository>,
    audit_enabled: bool,
}

impl WorkflowEngine {
    pub fn new(grants: Arc<GrantRepository>) -> Self {
        Self {
            workflows: HashMap::new(),
            grants,
            audit_enabled: true,
        }
    }

    /// Disables audit logging (for tests).
    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }

    /// Registers a workflow, validating its definition first.
    pub fn register(&mut self, workflow: Workflow) -> Result<(), WorkflowError> {
        workflow.validate()?;
        self.workflows.insert(workflow.code.clone(), workflow);
        Ok(())
    }

    /// Looks up a registered workflow.
    pub fn workflow(&self, code: &str) -> Result<&Workflow, WorkflowError> {
        self.workflows
            .get(code)
            .ok_or_else(|| WorkflowError::InvalidWorkflow {
                workflow: code.to_string(),
                reason: "not registered".to_string(),
            })
    }

    /// The record's current state, falling back to the starting state for
    /// records that have not entered the workflow yet.
    fn current_state<'a>(workflow: &'a Workflow, record: &'a Value) -> &'a str {
        record
            .get(&workflow.state_field)
            .and_then(Value::as_str)
            .unwrap_or(&workflow.starting_state)
    }

    /// Whether the state machine admits `action` from the record's current
    /// state. Authorization is not consulted here.
    pub fn can_transition(
        &self,
        workflow_code: &str,
        record: &Value,
        action: &str,
    ) -> Result<bool, WorkflowError> {
        let workflow = self.workflow(workflow_code)?;
        let state = Self::current_state(workflow, record);
        if workflow.is_ending(state) && !workflow.can_rollback {
            return Ok(false);
        }
        Ok(workflow.find_transition(state, action).is_some())
    }

    /// Workflow actions available from the record's current state.
    pub fn reachable_actions(
        &self,
        workflow_code: &str,
        record: &Value,
    ) -> Result<Vec<String>, WorkflowError> {
        let workflow = self.workflow(workflow_code)?;
        Ok(workflow.actions_from(Self::current_state(workflow, record)))
    }

    /// Applies a transition to `record`, mutating its state field in place.
    ///
    /// Sequence: re-validate the edge against the current state, authorize
    /// the principal through the grant repository, set the state field, run
    /// the handler (rolling the state back on abort or failure), then
    /// return the outcome. The caller persists the record and delivers the
    /// outcome's notifications after the write commits.
    pub fn apply_transition(
        &self,
        workflow_code: &str,
        principal: &PrincipalId,
        resource: &str,
        context: &str,
        record: &mut Value,
        action: &str,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(workflow_code, principal, resource, context, record, action, true)
    }

    /// [`Self::apply_transition`] without the grant check, for callers that
    /// have already authorized the request (admin bypass). The state machine
    /// is still enforced.
    pub fn apply_transition_preauthorized(
        &self,
        workflow_code: &str,
        principal: &PrincipalId,
        resource: &str,
        context: &str,
        record: &mut Value,
        action: &str,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(workflow_code, principal, resource, context, record, action, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        workflow_code: &str,
        principal: &PrincipalId,
        resource: &str,
        context: &str,
        record: &mut Value,
        action: &str,
        enforce_grants: bool,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let workflow = self.workflow(workflow_code)?;
        let from_state = Self::current_state(workflow, record).to_string();

        // State check first: an impossible transition is INVALID_STATE even
        // for a principal who could never be authorized for it.
        if workflow.is_ending(&from_state) && !workflow.can_rollback {
            return Err(WorkflowError::InvalidState {
                state: from_state,
                action: action.to_string(),
            });
        }
        let Some(transition) = workflow.find_transition(&from_state, action) else {
            return Err(WorkflowError::InvalidState {
                state: from_state,
                action: action.to_string(),
            });
        };

        let params = json!({"workflowActionCode": action});
        if enforce_grants
            && self
                .grants
                .authorize_record(
                    principal,
                    resource,
                    ActionCode::TriggerWorkflowById,
                    context,
                    record,
                    &params,
                )
                .is_none()
        {
            if self.audit_enabled {
                warn!(
                    principal = %principal,
                    workflow = %workflow_code,
                    action = %action,
                    "transition denied: no matching grant"
                );
            }
            return Err(WorkflowError::Forbidden {
                principal: principal.clone(),
                action: action.to_string(),
            });
        }

        let to_state = transition.to_state.clone();
        let snapshot = if transition.handler.is_some() {
            record.clone()
        } else {
            Value::Null
        };
        let Some(fields) = record.as_object_mut() else {
            return Err(WorkflowError::InvalidState {
                state: from_state,
                action: action.to_string(),
            });
        };
        fields.insert(workflow.state_field.clone(), Value::String(to_state.clone()));

        if let Some(handler) = &transition.handler {
            let ctx = TransitionContext {
                principal,
                resource,
                context,
                action,
            };
            let verdict = handler.on_transition(&ctx, record, &snapshot);
            let failure = match verdict {
                Ok(HandlerVerdict::Proceed) => None,
                Ok(HandlerVerdict::Abort { reason }) => Some(reason),
                Err(err) => Some(err.to_string()),
            };
            if let Some(reason) = failure {
                // Restore the whole pre-transition record: a handler may
                // have mutated other fields before aborting.
                *record = snapshot;
                if self.audit_enabled {
                    warn!(
                        principal = %principal,
                        workflow = %workflow_code,
                        action = %action,
                        reason = %reason,
                        "transition rolled back by handler"
                    );
                }
                return Err(WorkflowError::HandlerFailure {
                    action: action.to_string(),
                    reason,
                });
            }
        }

        if self.audit_enabled {
            info!(
                principal = %principal,
                workflow = %workflow_code,
                action = %action,
                from = %from_state,
                to = %to_state,
                "transition applied"
            );
        }

        Ok(TransitionOutcome {
            from_state,
            reachable_actions: workflow.actions_from(&to_state),
            notifications: transition.notifications.clone(),
            to_state,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
