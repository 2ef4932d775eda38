//! Testing utilities for the Canopy workspace
//!
//! Shared model fixtures and sample trees.

#![allow(missing_docs)]

use canopy_tree::{
    impl_properties, AsAny, Capabilities, Dependent, LinkSlot, Model, NodeId, Properties, Tree,
};
use indexmap::IndexMap;
use serde_json::Value;

/// Plain container
#[derive(Debug, Clone, Default)]
pub struct Folder;

impl Model for Folder {
    fn kind(&self) -> &str {
        "Folder"
    }
}

/// Container that bounds scope
#[derive(Debug, Clone, Default)]
pub struct Boundary;

impl Model for Boundary {
    fn kind(&self) -> &str {
        "Boundary"
    }

    fn markers(&self) -> Capabilities {
        Capabilities::SCOPE_BOUNDARY
    }
}

pub fn folder() -> Box<dyn Model> {
    Box::new(Folder)
}

pub fn boundary() -> Box<dyn Model> {
    Box::new(Boundary)
}

/// Model with a scalar, an array and an object property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Probe {
    pub value: f64,
    pub layers: Vec<f64>,
    pub config: Value,
}

impl Probe {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            layers: Vec::new(),
            config: Value::Null,
        }
    }

    pub fn with_layers(mut self, layers: Vec<f64>) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

impl_properties!(Probe {
    value => "Value",
    layers => "Layers",
    config => "Config",
});

impl Model for Probe {
    fn kind(&self) -> &str {
        "Probe"
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }
}

pub fn probe(value: f64) -> Box<dyn Model> {
    Box::new(Probe::new(value))
}

/// Model with configurable link slots that records what it was bound to
#[derive(Debug, Clone, Default)]
pub struct Linker {
    pub slots: Vec<LinkSlot>,
    pub bound: IndexMap<String, Vec<NodeId>>,
}

impl Linker {
    pub fn new(slots: Vec<LinkSlot>) -> Self {
        Self {
            slots,
            bound: IndexMap::new(),
        }
    }
}

impl Model for Linker {
    fn kind(&self) -> &str {
        "Linker"
    }

    fn dependent(&self) -> Option<&dyn Dependent> {
        Some(self)
    }

    fn dependent_mut(&mut self) -> Option<&mut dyn Dependent> {
        Some(self)
    }
}

impl Dependent for Linker {
    fn link_slots(&self) -> Vec<LinkSlot> {
        self.slots.clone()
    }

    fn bind(&mut self, field: &str, targets: &[NodeId]) {
        self.bound.insert(field.to_string(), targets.to_vec());
    }
}

pub fn linker(slots: Vec<LinkSlot>) -> Box<dyn Model> {
    Box::new(Linker::new(slots))
}

/// Targets bound to `field` of the [`Linker`] at `id`
pub fn bound_targets(tree: &Tree, id: NodeId, field: &str) -> Option<Vec<NodeId>> {
    tree.model(id)?
        .as_any()
        .downcast_ref::<Linker>()?
        .bound
        .get(field)
        .cloned()
}

/// Root { A(boundary) { Leaf }, B }
pub struct ScopeScenario {
    pub tree: Tree,
    pub root: NodeId,
    pub a: NodeId,
    pub leaf: NodeId,
    pub b: NodeId,
}

pub fn scope_scenario() -> ScopeScenario {
    let mut tree = Tree::new("Root", folder());
    let root = tree.root();
    let a = tree.add_child(root, "A", boundary()).unwrap();
    let leaf = tree.add_child(a, "Leaf", folder()).unwrap();
    let b = tree.add_child(root, "B", folder()).unwrap();
    ScopeScenario {
        tree,
        root,
        a,
        leaf,
        b,
    }
}
