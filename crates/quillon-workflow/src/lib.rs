//! # quillon-workflow: Workflow transitions for `Quillon`
//!
//! A workflow is a finite state machine over one string-valued field of a
//! record. Definitions declare the edges ([`Workflow`], [`Transition`]); the
//! [`WorkflowEngine`] executes them, authorizing each transition through the
//! grant repository as a `triggerWorkflowById` request whose api-params
//! carry the workflow action code.
//!
//! Side effects run through [`TransitionHandler`] hooks that can veto a
//! transition; notifications are deferred into the [`TransitionOutcome`] so
//! they are only delivered once the record write commits.

pub mod definition;
pub mod engine;

pub use definition::{DefinitionError, NotificationDirective, Transition, Workflow};
pub use engine::{
    HandlerVerdict, TransitionContext, TransitionHandler, TransitionOutcome, WorkflowEngine,
    WorkflowError,
};
