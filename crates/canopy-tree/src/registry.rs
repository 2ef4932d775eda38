//! Type registry for node construction
//!
//! Provides [`TypeRegistry`], an explicit map from a short kind name to a
//! factory producing a fresh model value. Kinds are registered at startup;
//! nothing is discovered at runtime.

use crate::adapted::{AdaptedValue, Discovered, Discovery};
use crate::error::TreeError;
use crate::model::Model;
use crate::tree::{NodeId, Tree};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Produces a default-initialized model value
pub type Factory = Arc<dyn Fn() -> Box<dyn Model> + Send + Sync>;

/// Registry of constructible node kinds
///
/// Lookups ignore ASCII case; the registered spelling is kept for listing.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    factories: IndexMap<String, (String, Factory)>,
    adapters: IndexMap<String, (String, Discovery)>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("kinds", &self.kinds())
            .field("adapters", &self.adapter_kinds())
            .finish()
    }
}

fn key(kind: &str) -> String {
    kind.to_ascii_lowercase()
}

impl TypeRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type under the kind its default value reports
    pub fn register<M: Model + Default + 'static>(&mut self) -> &mut Self {
        let kind = M::default().kind().to_string();
        self.register_factory(kind, || Box::new(M::default()) as Box<dyn Model>)
    }

    /// Register an explicit factory
    pub fn register_factory<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Model> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::trace!(kind = %kind, "registering node kind");
        self.factories
            .insert(key(&kind), (kind, Arc::new(factory)));
        self
    }

    /// Register a discovery function for adapted plain values
    pub fn register_adapter(&mut self, kind: impl Into<String>, discovery: Discovery) -> &mut Self {
        let kind = kind.into();
        self.adapters.insert(key(&kind), (kind, discovery));
        self
    }

    /// Whether a factory exists for `kind`
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(&key(kind))
    }

    /// Whether a discovery function exists for `kind`
    #[inline]
    #[must_use]
    pub fn is_adapted(&self, kind: &str) -> bool {
        self.adapters.contains_key(&key(kind))
    }

    /// Registered factory kinds in registration order
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.values().map(|(k, _)| k.as_str()).collect()
    }

    /// Registered adapter kinds in registration order
    #[must_use]
    pub fn adapter_kinds(&self) -> Vec<&str> {
        self.adapters.values().map(|(k, _)| k.as_str()).collect()
    }

    /// Number of registered factories
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate a fresh model of `kind`
    ///
    /// # Errors
    /// [`TreeError::UnknownNodeKind`] if nothing is registered for `kind`
    pub fn create(&self, kind: &str) -> Result<Box<dyn Model>, TreeError> {
        self.factories
            .get(&key(kind))
            .map(|(_, factory)| factory())
            .ok_or_else(|| TreeError::UnknownNodeKind {
                kind: kind.to_string(),
            })
    }

    /// Build a tree from an adapted value and its discovered children
    ///
    /// # Errors
    /// [`TreeError::UnknownNodeKind`] if any value in the hierarchy has a kind
    /// with no registered discovery function
    pub fn build_adapted(&self, value: AdaptedValue) -> Result<Tree, TreeError> {
        let discovered = self.discover(&value)?;
        let mut tree = Tree::new(discovered.name, Box::new(value));
        let root = tree.root();
        for child in discovered.children {
            self.attach_adapted(&mut tree, root, child)?;
        }
        Ok(tree)
    }

    /// Add an adapted value and its discovered children under `parent`
    ///
    /// # Errors
    /// Same as [`TypeRegistry::build_adapted`]
    pub fn attach_adapted(
        &self,
        tree: &mut Tree,
        parent: NodeId,
        value: AdaptedValue,
    ) -> Result<NodeId, TreeError> {
        let discovered = self.discover(&value)?;
        let id = tree.add_child(parent, discovered.name, Box::new(value))?;
        for child in discovered.children {
            self.attach_adapted(tree, id, child)?;
        }
        Ok(id)
    }

    fn discover(&self, value: &AdaptedValue) -> Result<Discovered, TreeError> {
        let (_, discovery) =
            self.adapters
                .get(&key(value.kind()))
                .ok_or_else(|| TreeError::UnknownNodeKind {
                    kind: value.kind().to_string(),
                })?;
        Ok(discovery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapted::discover_nested;
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct Clock;

    impl Model for Clock {
        fn kind(&self) -> &str {
            "Clock"
        }
    }

    #[test]
    fn registry_new_empty() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn create_ignores_case() {
        let mut registry = TypeRegistry::new();
        registry.register::<Clock>();

        assert!(registry.contains("clock"));
        assert_eq!(registry.kinds(), vec!["Clock"]);
        assert_eq!(registry.create("CLOCK").unwrap().kind(), "Clock");
    }

    #[test]
    fn unknown_kind_fails() {
        let registry = TypeRegistry::new();
        let err = registry.create("Nope").unwrap_err();
        assert!(matches!(err, TreeError::UnknownNodeKind { kind } if kind == "Nope"));
    }

    #[test]
    fn adapted_values_expand_into_nodes() {
        let mut registry = TypeRegistry::new();
        registry.register_adapter("Params", discover_nested);

        let value = AdaptedValue::new("Params", json!({"Name": "Top", "A": {"X": 1}, "B": {}}));
        let tree = registry.build_adapted(value).unwrap();

        let paths: Vec<_> = tree.walk(tree.root()).map(|id| tree.path_of(id).to_string()).collect();
        assert_eq!(paths, ["Top", "Top.A", "Top.B"]);
    }

    #[test]
    fn adapted_without_discovery_fails() {
        let registry = TypeRegistry::new();
        let value = AdaptedValue::new("Params", json!({}));
        assert!(matches!(
            registry.build_adapted(value),
            Err(TreeError::UnknownNodeKind { .. })
        ));
    }
}
