//! Engine-level error taxonomy.
//!
//! Every deny path maps to one of these variants so HTTP layers can
//! translate mechanically: `InvalidArgument` → 400, `Forbidden` → 403,
//! `InvalidState`/`InvalidWorkflow`/`HandlerFailure` → 409/422 per the
//! hosting platform's convention.

use quillon_abac::PolicyError;
use quillon_types::{ActionCode, PrincipalId};
use quillon_workflow::{DefinitionError, WorkflowError};
use thiserror::Error;

/// Result type for gatekeeper operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Error type for the access-control engine.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The request itself is malformed (unknown resource, bad field list).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// No grant authorizes the principal for this resource/action/record.
    #[error("principal '{principal}' is not authorized for {action} on '{resource}'")]
    Forbidden {
        principal: PrincipalId,
        resource: String,
        action: ActionCode,
    },

    /// A stored policy failed load-time validation.
    #[error("policy rejected: {0}")]
    Policy(#[from] PolicyError),

    /// A workflow definition failed registration.
    #[error("workflow definition rejected: {0}")]
    Definition(#[from] DefinitionError),

    /// A workflow transition failed (bad edge, unauthorized, or handler
    /// rollback).
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl AccessError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        AccessError::InvalidArgument {
            reason: reason.into(),
        }
    }
}
