//! # Quillon: ABAC and workflow transitions for schema-driven CRUD
//!
//! Quillon decides, for every CRUD request in a schema-driven platform,
//! whether a principal may run an action against a resource — and under what
//! row and field scope. Permissions are declarative [`Policy`] documents;
//! matched against a principal's feature snapshot they materialize into
//! [`Grant`]s, which are then enforced two ways:
//!
//! - **Point check** — record-shaped requests (`getById`, `updateById`, ...)
//!   evaluate each grant's record and api-param conditions against the
//!   loaded record; the first passing grant decides the field allow-lists.
//! - **Filter compilation** — list-shaped requests compile every covering
//!   grant into one OR-of-ANDs filter pushed down to the data store, so row
//!   scoping happens where the rows live.
//!
//! Records that carry a lifecycle use the workflow engine: a state machine
//! per resource field, with transitions authorized through
//! `triggerWorkflowById` grants and side effects run through veto-capable
//! handlers.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use quillon::{
//!     ActionCode, FeatureCondition, FeatureSet, Gatekeeper, GrantRepository,
//!     InMemoryFeatureStore, InMemoryPolicyStore, Policy, PrincipalContext, PrincipalId,
//! };
//! use quillon::{DataType, Operator};
//! use serde_json::json;
//!
//! let features = Arc::new(InMemoryFeatureStore::new());
//! features.upsert(
//!     PrincipalId::new("alice"),
//!     FeatureSet::new().with("USER_ID", vec!["alice".into()]),
//! );
//!
//! let policies = Arc::new(InMemoryPolicyStore::new());
//! policies
//!     .insert(
//!         Policy::new("v1/invoices", ActionCode::GetById)
//!             .with_record_condition(FeatureCondition::principal_feature(
//!                 "ownerId", DataType::Id, Operator::Eq, "USER_ID",
//!             ))
//!             .allow_all_fields(),
//!     )
//!     .unwrap();
//!
//! let gatekeeper = Gatekeeper::new(
//!     features.clone(),
//!     policies.clone(),
//!     Arc::new(GrantRepository::new()),
//! );
//! gatekeeper.refresh_principal(&PrincipalId::new("alice"));
//!
//! let ctx = PrincipalContext::new("alice");
//! let own_record = json!({"ownerId": "alice", "amount": 120});
//! assert!(gatekeeper
//!     .resolve_record_permission(
//!         &ctx, "v1/invoices", ActionCode::GetById, &own_record, &json!({}), &[], &[],
//!     )
//!     .is_ok());
//! ```

pub mod error;
pub mod gatekeeper;
pub mod store;

pub use error::{AccessError, Result};
pub use gatekeeper::{Gatekeeper, PrincipalContext, QueryPermission, RecordPermission};
pub use store::{InMemoryPolicyStore, PolicyStore};

// Re-export the building blocks so most integrations need only this crate.
pub use quillon_abac::{
    ALL_FIELDS, ConditionOutcome, Conjunction, DataType, FeatureCondition, FeatureSet,
    FeatureStore, FilterExpression, FilterTerm, FilterValue, Grant, GrantRepository,
    InMemoryFeatureStore, MissingFieldPolicy, OperandList, Operator, Policy,
};
pub use quillon_types::{ActionCode, PrincipalId};
pub use quillon_workflow::{
    HandlerVerdict, NotificationDirective, Transition, TransitionContext, TransitionHandler,
    TransitionOutcome, Workflow, WorkflowEngine, WorkflowError,
};
