//! # quillon-abac: Attribute-based access control for `Quillon`
//!
//! The ABAC core of the Quillon access-control engine:
//!
//! - **Features** ([`feature`]): named multi-valued attributes held by a
//!   principal, served by a [`FeatureStore`].
//! - **Conditions** ([`condition`]): typed predicates over record fields,
//!   with the three-valued Pass/Fail/Skip evaluator.
//! - **Policies** ([`policy`]): declarative permission templates, matched
//!   against a principal's features to materialize grants.
//! - **Grants** ([`grant`]): principal-bound permissions held in a
//!   [`GrantRepository`], point-checked per record at request time.
//! - **Filters** ([`filter`]): compilation of grants into push-down search
//!   filters for list-shaped reads.
//!
//! The per-record decision path is `Policy` → (principal match) → `Grant` →
//! (record + api-param conditions) → allow/deny with field allow-lists.
//! List reads instead compile every covering grant into one
//! [`FilterExpression`] so the data store enforces the row scope.

pub mod condition;
pub mod feature;
pub mod filter;
pub mod grant;
pub mod policy;

pub use condition::{
    ConditionError, ConditionOutcome, DataType, FeatureCondition, MissingFieldPolicy, OperandList,
    Operator, check_record_permission, evaluate_condition,
};
pub use feature::{FeatureSet, FeatureStore, InMemoryFeatureStore};
pub use filter::{
    Conjunction, FilterExpression, FilterTerm, FilterValue, compile_search_filter,
};
pub use grant::{Grant, GrantRepository};
pub use policy::{
    ALL_FIELDS, Policy, PolicyError, check_field_permission, match_policy_to_principal,
};
