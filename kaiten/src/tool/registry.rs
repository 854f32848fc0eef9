//! Name-keyed capability registry.
//!
//! Two entry points with deliberately different duplicate handling:
//!
//! - [`register`](CapabilityRegistry::register) and
//!   [`register_all`](CapabilityRegistry::register_all) reject a name that is
//!   already taken, including a name repeated within one batch
//! - [`merge`](CapabilityRegistry::merge) and
//!   [`merge_all`](CapabilityRegistry::merge_all) combine independently
//!   supplied lists; a later capability replaces an earlier one of the same
//!   name (last wins)

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::capability::SharedCapability;
use super::definition::ToolDefinition;
use crate::error::ConfigError;

/// Registry of capabilities keyed by name, in registration order.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: Vec<SharedCapability>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one capability, rejecting a taken name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateCapability`] if the name is registered,
    /// [`ConfigError::InvalidCapability`] if the descriptor is malformed.
    pub fn register(&mut self, capability: SharedCapability) -> Result<(), ConfigError> {
        capability.spec().validate()?;
        let name = capability.name();
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateCapability(name.to_owned()));
        }
        self.push(capability);
        Ok(())
    }

    /// Add a batch of capabilities, all or nothing.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateCapability`] if any name is already registered
    /// or appears twice in the batch; nothing is added in that case.
    pub fn register_all(
        &mut self,
        capabilities: impl IntoIterator<Item = SharedCapability>,
    ) -> Result<(), ConfigError> {
        let batch: Vec<SharedCapability> = capabilities.into_iter().collect();
        let mut seen = HashSet::new();
        for capability in &batch {
            capability.spec().validate()?;
            let name = capability.name();
            if self.index.contains_key(name) || !seen.insert(name) {
                return Err(ConfigError::DuplicateCapability(name.to_owned()));
            }
        }
        for capability in batch {
            self.push(capability);
        }
        Ok(())
    }

    /// Add or replace one capability (last wins).
    ///
    /// A replaced capability keeps its original position.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCapability`] if the descriptor is malformed.
    pub fn merge(&mut self, capability: SharedCapability) -> Result<(), ConfigError> {
        capability.spec().validate()?;
        if let Some(&slot) = self.index.get(capability.name()) {
            tracing::debug!(capability = %capability.name(), "replacing capability on merge");
            self.entries[slot] = capability;
        } else {
            self.push(capability);
        }
        Ok(())
    }

    /// Merge a list of capabilities (last wins, within the list too).
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCapability`] for the first malformed descriptor;
    /// capabilities before it remain merged.
    pub fn merge_all(
        &mut self,
        capabilities: impl IntoIterator<Item = SharedCapability>,
    ) -> Result<(), ConfigError> {
        capabilities.into_iter().try_for_each(|c| self.merge(c))
    }

    /// Merge every capability of `other` (last wins).
    pub fn extend_from(&mut self, other: &Self) {
        for capability in &other.entries {
            // Entries of a registry were validated when they were added.
            let _ = self.merge(SharedCapability::clone(capability));
        }
    }

    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedCapability> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.name()).collect()
    }

    /// Provider-formatted definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|c| c.definition()).collect()
    }

    /// Iterate over capabilities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SharedCapability> {
        self.entries.iter()
    }

    fn push(&mut self, capability: SharedCapability) {
        self.index
            .insert(capability.name().to_owned(), self.entries.len());
        self.entries.push(capability);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{Arguments, Capability, CapabilitySpec, FnCapability};

    fn constant(name: &str, value: Value) -> SharedCapability {
        FnCapability::sync(CapabilitySpec::new(name), move |_| Ok(value.clone())).shared()
    }

    async fn call(registry: &CapabilityRegistry, name: &str) -> Value {
        registry
            .get(name)
            .unwrap()
            .invoke(Arguments::default())
            .await
            .unwrap()
    }

    mod register {
        use super::*;

        #[test]
        fn rejects_existing_name() {
            let mut registry = CapabilityRegistry::new();
            registry.register(constant("a", json!(1))).unwrap();
            let err = registry.register(constant("a", json!(2))).unwrap_err();
            assert_eq!(err, ConfigError::DuplicateCapability("a".into()));
            assert_eq!(registry.len(), 1);
        }

        #[test]
        fn rejects_duplicate_within_batch_atomically() {
            let mut registry = CapabilityRegistry::new();
            let err = registry
                .register_all([constant("x", json!(1)), constant("y", json!(2)), constant("x", json!(3))])
                .unwrap_err();
            assert_eq!(err, ConfigError::DuplicateCapability("x".into()));
            assert!(registry.is_empty());
        }

        #[test]
        fn rejects_invalid_descriptor() {
            let mut registry = CapabilityRegistry::new();
            let err = registry.register(constant("", json!(1))).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidCapability(_)));
        }

        #[test]
        fn preserves_registration_order() {
            let mut registry = CapabilityRegistry::new();
            registry
                .register_all([constant("b", json!(1)), constant("a", json!(2))])
                .unwrap();
            assert_eq!(registry.names(), vec!["b", "a"]);
            let defs = registry.definitions();
            assert_eq!(defs[0].name, "b");
            assert_eq!(defs[1].name, "a");
        }
    }

    mod merge {
        use super::*;

        #[tokio::test]
        async fn last_wins_across_merges() {
            let mut registry = CapabilityRegistry::new();
            registry.merge_all([constant("calc", json!("first"))]).unwrap();
            registry.merge_all([constant("calc", json!("second"))]).unwrap();
            assert_eq!(registry.len(), 1);
            assert_eq!(call(&registry, "calc").await, json!("second"));
        }

        #[tokio::test]
        async fn last_wins_within_list() {
            let mut registry = CapabilityRegistry::new();
            registry
                .merge_all([constant("a", json!(1)), constant("b", json!(0)), constant("a", json!(2))])
                .unwrap();
            assert_eq!(registry.names(), vec!["a", "b"]);
            assert_eq!(call(&registry, "a").await, json!(2));
        }

        #[tokio::test]
        async fn extend_from_overrides() {
            let mut base = CapabilityRegistry::new();
            base.register(constant("a", json!(1))).unwrap();
            let mut overrides = CapabilityRegistry::new();
            overrides.register(constant("a", json!(9))).unwrap();
            overrides.register(constant("z", json!(0))).unwrap();

            base.extend_from(&overrides);
            assert_eq!(base.names(), vec!["a", "z"]);
            assert_eq!(call(&base, "a").await, json!(9));
        }
    }

    #[test]
    fn lookup_missing() {
        let registry = CapabilityRegistry::new();
        assert!(registry.get("ghost").is_none());
        assert!(!registry.contains("ghost"));
    }
}
