//! Policy storage.
//!
//! Policies are configuration, loaded from the platform's schema store and
//! validated on the way in. The gatekeeper reads them only when it rebuilds
//! a principal's grants, so the store surface is deliberately small.

use std::sync::RwLock;

use quillon_abac::Policy;

use crate::error::Result;

/// Source of stored policies.
///
/// Order matters: grants are materialized in the order policies are
/// returned, and the point-check consults grants in that order.
pub trait PolicyStore: Send + Sync {
    /// Every stored policy, in storage order.
    fn policies(&self) -> Vec<Policy>;
}

/// Policy store backed by process memory.
///
/// Writes validate each policy before accepting it, so configuration errors
/// surface at load time rather than during evaluation.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    inner: RwLock<Vec<Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one policy after validating it.
    pub fn insert(&self, policy: Policy) -> Result<()> {
        policy.validate()?;
        let mut guard = self.inner.write().expect("policy store lock poisoned");
        guard.push(policy);
        Ok(())
    }

    /// Replaces the whole policy set (configuration reload). All policies
    /// must validate or the previous set stays in place.
    pub fn replace_all(&self, policies: Vec<Policy>) -> Result<()> {
        for policy in &policies {
            policy.validate()?;
        }
        let mut guard = self.inner.write().expect("policy store lock poisoned");
        *guard = policies;
        Ok(())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn policies(&self) -> Vec<Policy> {
        self.inner
            .read()
            .expect("policy store lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillon_abac::{DataType, FeatureCondition, Operator};
    use quillon_types::ActionCode;

    #[test]
    fn test_insert_validates() {
        let store = InMemoryPolicyStore::new();
        store
            .insert(Policy::new("v1/invoices", ActionCode::GetList))
            .unwrap();
        assert!(store.insert(Policy::new("", ActionCode::GetList)).is_err());
        assert_eq!(store.policies().len(), 1);
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let store = InMemoryPolicyStore::new();
        store
            .insert(Policy::new("v1/invoices", ActionCode::GetList))
            .unwrap();

        let bad_batch = vec![
            Policy::new("v1/orders", ActionCode::GetList),
            // Ordering operator on a principal condition: rejected.
            Policy::new("v1/orders", ActionCode::Create).with_principal_condition(
                FeatureCondition::literal("CLEARANCE", DataType::Number, Operator::Gt, "2"),
            ),
        ];
        assert!(store.replace_all(bad_batch).is_err());

        // Previous set untouched.
        let kept = store.policies();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].resource_code, "v1/invoices");
    }
}
