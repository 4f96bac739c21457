//! Principal features and the feature store.
//!
//! A feature is a named attribute value attached to a principal — the set of
//! role ids it holds (`"ROLE_LIST"`), the functions it may open
//! (`"FUNCTION_LIST"`), its own id (`"USER_ID"`). Features are recomputed by
//! the surrounding platform whenever a principal is created or updated; the
//! store here is a pure lookup with no derivation logic of its own.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use quillon_types::PrincipalId;

// ============================================================================
// FeatureSet
// ============================================================================

/// The full feature snapshot of one principal.
///
/// Unique by feature name; values keep their stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    values: BTreeMap<String, Vec<String>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a feature (builder pattern).
    pub fn with(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.values.insert(name.into(), values);
        self
    }

    /// Adds or replaces a feature in place.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.values.insert(name.into(), values);
    }

    /// Returns the values of the named feature, if the principal holds it.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Whether the principal holds the named feature at all.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Whether the snapshot holds no features.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, values)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

// ============================================================================
// FeatureStore
// ============================================================================

/// Lookup of a principal's feature snapshot.
///
/// The engine only reads through this trait; writes happen on the concrete
/// store when the platform reacts to principal lifecycle events.
pub trait FeatureStore: Send + Sync {
    /// Returns the feature snapshot for a principal, or `None` for an
    /// unknown principal.
    fn features_for(&self, principal: &PrincipalId) -> Option<FeatureSet>;
}

/// In-memory feature store, safe under concurrent readers.
///
/// Constructed once at startup and shared by reference; callers replace a
/// principal's snapshot wholesale on create/update and remove it on delete.
#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    inner: RwLock<HashMap<PrincipalId, FeatureSet>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the principal's entire snapshot.
    pub fn upsert(&self, principal: PrincipalId, features: FeatureSet) {
        let mut guard = self.inner.write().expect("feature store lock poisoned");
        guard.insert(principal, features);
    }

    /// Removes the principal's snapshot (principal deleted).
    pub fn remove(&self, principal: &PrincipalId) {
        let mut guard = self.inner.write().expect("feature store lock poisoned");
        guard.remove(principal);
    }
}

impl FeatureStore for InMemoryFeatureStore {
    fn features_for(&self, principal: &PrincipalId) -> Option<FeatureSet> {
        let guard = self.inner.read().expect("feature store lock poisoned");
        guard.get(principal).cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set_builder_and_lookup() {
        let features = FeatureSet::new()
            .with("ROLE_LIST", vec!["r1".to_string(), "r2".to_string()])
            .with("USER_ID", vec!["u9".to_string()]);

        assert_eq!(features.get("ROLE_LIST"), Some(["r1".to_string(), "r2".to_string()].as_slice()));
        assert!(features.contains("USER_ID"));
        assert!(features.get("FUNCTION_LIST").is_none());
    }

    #[test]
    fn test_feature_set_unique_by_name() {
        let features = FeatureSet::new()
            .with("ROLE_LIST", vec!["r1".to_string()])
            .with("ROLE_LIST", vec!["r2".to_string()]);
        assert_eq!(features.get("ROLE_LIST"), Some(["r2".to_string()].as_slice()));
    }

    #[test]
    fn test_store_upsert_replaces_snapshot() {
        let store = InMemoryFeatureStore::new();
        let alice = PrincipalId::new("alice");

        store.upsert(alice.clone(), FeatureSet::new().with("ROLE_LIST", vec!["r1".to_string()]));
        store.upsert(alice.clone(), FeatureSet::new().with("USER_ID", vec!["alice".to_string()]));

        let snapshot = store.features_for(&alice).unwrap();
        assert!(snapshot.contains("USER_ID"));
        // Replaced wholesale, not merged.
        assert!(!snapshot.contains("ROLE_LIST"));
    }

    #[test]
    fn test_store_remove_and_unknown_principal() {
        let store = InMemoryFeatureStore::new();
        let bob = PrincipalId::new("bob");

        store.upsert(bob.clone(), FeatureSet::new());
        assert!(store.features_for(&bob).is_some());

        store.remove(&bob);
        assert!(store.features_for(&bob).is_none());
        assert!(store.features_for(&PrincipalId::new("nobody")).is_none());
    }
}
