//! Serializable tree descriptions
//!
//! A [`TreeDescription`] is the hand-off format between a tree source (file
//! loader, converter, transport) and the composition tree. Building goes
//! through a [`TypeRegistry`] so only registered kinds can be instantiated.

use crate::adapted::AdaptedValue;
use crate::error::{PropertyError, TreeError};
use crate::model::Model;
use crate::registry::TypeRegistry;
use crate::tree::{NodeId, Tree};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of one node and its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDescription {
    /// Registered kind
    pub kind: String,
    /// Node name; defaults to the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Property values applied after construction
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,
    /// Child descriptions in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeDescription>,
}

impl TreeDescription {
    /// Describe a node of `kind`
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            properties: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Set the node name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a property value
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Add a child description
    #[must_use]
    pub fn with_child(mut self, child: TreeDescription) -> Self {
        self.children.push(child);
        self
    }

    fn node_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    /// Build a tree, stopping at the first error
    ///
    /// # Errors
    /// [`TreeError::UnknownNodeKind`] for an unregistered kind and
    /// [`TreeError::Property`] for a property that cannot be set
    pub fn build(&self, registry: &TypeRegistry) -> Result<Tree, TreeError> {
        let mut tree = self.build_root(registry)?;
        let root = tree.root();
        for child in &self.children {
            child.attach(registry, &mut tree, root, &mut None)?;
        }
        Ok(tree)
    }

    /// Build a tree, skipping nodes that fail and collecting their errors
    ///
    /// A failing node is dropped together with its subtree; siblings are still
    /// built.
    ///
    /// # Errors
    /// Fails only when the root itself cannot be built
    pub fn build_collecting(
        &self,
        registry: &TypeRegistry,
    ) -> Result<(Tree, Vec<TreeError>), TreeError> {
        let mut tree = self.build_root(registry)?;
        let root = tree.root();
        let mut errors = Some(Vec::new());
        for child in &self.children {
            child.attach(registry, &mut tree, root, &mut errors)?;
        }
        Ok((tree, errors.unwrap_or_default()))
    }

    /// Describe a node and its subtree
    #[must_use]
    pub fn describe(tree: &Tree, id: NodeId) -> Option<Self> {
        let node = tree.get(id)?;
        let model = node.model();
        let properties = model
            .properties()
            .map(|props| {
                props
                    .property_names()
                    .into_iter()
                    .filter_map(|name| props.get_property(&name).map(|v| (name, v)))
                    .collect()
            })
            .unwrap_or_default();
        let children = node
            .children()
            .iter()
            .filter_map(|&child| Self::describe(tree, child))
            .collect();
        Some(Self {
            kind: model.kind().to_string(),
            name: Some(node.name().to_string()),
            properties,
            children,
        })
    }

    fn build_root(&self, registry: &TypeRegistry) -> Result<Tree, TreeError> {
        if !registry.contains(&self.kind) && registry.is_adapted(&self.kind) {
            return registry.build_adapted(self.adapted());
        }
        let model = self.instantiate(registry)?;
        Ok(Tree::new(self.node_name(), model))
    }

    /// Add this description under `parent`; with `errors` set, failures are
    /// recorded there instead of returned
    fn attach(
        &self,
        registry: &TypeRegistry,
        tree: &mut Tree,
        parent: NodeId,
        errors: &mut Option<Vec<TreeError>>,
    ) -> Result<(), TreeError> {
        let created = if !registry.contains(&self.kind) && registry.is_adapted(&self.kind) {
            registry.attach_adapted(tree, parent, self.adapted())
        } else {
            self.instantiate(registry)
                .and_then(|model| tree.add_child(parent, self.node_name(), model))
        };

        let id = match (created, errors.as_mut()) {
            (Ok(id), _) => id,
            (Err(err), Some(errors)) => {
                tracing::warn!(kind = %self.kind, name = %self.node_name(), error = %err, "skipping node");
                errors.push(err);
                return Ok(());
            }
            (Err(err), None) => return Err(err),
        };

        for child in &self.children {
            child.attach(registry, tree, id, errors)?;
        }
        Ok(())
    }

    fn instantiate(&self, registry: &TypeRegistry) -> Result<Box<dyn Model>, TreeError> {
        let mut model = registry.create(&self.kind)?;
        if self.properties.is_empty() {
            return Ok(model);
        }
        let kind = model.kind().to_string();
        let props = model.properties_mut().ok_or_else(|| TreeError::Property {
            node: self.node_name().to_string(),
            source: PropertyError::NotSettable { kind },
        })?;
        for (name, value) in &self.properties {
            props
                .set_property(name, value.clone())
                .map_err(|source| TreeError::Property {
                    node: self.node_name().to_string(),
                    source,
                })?;
        }
        Ok(model)
    }

    fn adapted(&self) -> AdaptedValue {
        let mut data: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        data.entry("Name")
            .or_insert_with(|| Value::String(self.node_name().to_string()));
        AdaptedValue::new(self.kind.clone(), Value::Object(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapted::discover_nested;
    use crate::impl_properties;
    use crate::model::Properties;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct Folder;

    impl Model for Folder {
        fn kind(&self) -> &str {
            "Folder"
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Constant {
        value: f64,
    }

    impl_properties!(Constant { value => "Value" });

    impl Model for Constant {
        fn kind(&self) -> &str {
            "Constant"
        }

        fn properties(&self) -> Option<&dyn Properties> {
            Some(self)
        }

        fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
            Some(self)
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Folder>()
            .register::<Constant>()
            .register_adapter("Params", discover_nested);
        registry
    }

    fn sample() -> TreeDescription {
        TreeDescription::new("Folder")
            .named("Root")
            .with_child(TreeDescription::new("Constant").named("K").with_property("Value", json!(2.5)))
            .with_child(TreeDescription::new("Folder").named("Sub"))
    }

    #[test]
    fn build_sets_properties() {
        let tree = sample().build(&registry()).unwrap();
        let k = tree.find("K", tree.root(), false).unwrap();
        let value = tree.model(k).unwrap().properties().unwrap().get_property("value");
        assert_eq!(value, Some(json!(2.5)));
    }

    #[test]
    fn describe_round_trips() {
        let description = sample();
        let tree = description.build(&registry()).unwrap();
        let described = TreeDescription::describe(&tree, tree.root()).unwrap();
        assert_eq!(described.build(&registry()).unwrap().node_count(), 3);
        assert_eq!(described.children[0].properties["Value"], json!(2.5));
        assert_eq!(described.children[1].name.as_deref(), Some("Sub"));
    }

    #[test]
    fn unknown_kind_fails_fast() {
        let description = sample().with_child(TreeDescription::new("Mystery"));
        let err = description.build(&registry()).unwrap_err();
        assert!(matches!(err, TreeError::UnknownNodeKind { kind } if kind == "Mystery"));
    }

    #[test]
    fn collecting_keeps_siblings() {
        let description = sample()
            .with_child(TreeDescription::new("Mystery"))
            .with_child(TreeDescription::new("Folder").named("After"));
        let (tree, errors) = description.build_collecting(&registry()).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(tree.find("After", tree.root(), false).is_some());
    }

    #[test]
    fn bad_property_is_reported() {
        let description = TreeDescription::new("Folder").with_property("Value", json!(1));
        assert!(matches!(
            description.build(&registry()),
            Err(TreeError::Property { .. })
        ));
    }

    #[test]
    fn adapted_kinds_build_through_discovery() {
        let description = TreeDescription::new("Folder").with_child(
            TreeDescription::new("Params")
                .named("P")
                .with_property("Rate", json!(3)),
        );
        let tree = description.build(&registry()).unwrap();
        let p = tree.find("P", tree.root(), false).unwrap();
        assert_eq!(tree[p].kind(), "Params");
    }

    #[test]
    fn deserializes_from_json() {
        let description: TreeDescription = serde_json::from_value(json!({
            "kind": "Folder",
            "name": "Root",
            "children": [{"kind": "Constant", "properties": {"Value": 1}}]
        }))
        .unwrap();
        let tree = description.build(&registry()).unwrap();
        assert!(tree.find("Constant", tree.root(), false).is_some());
    }
}
