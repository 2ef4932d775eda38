//! Model capabilities
//!
//! A model value is a plain Rust type implementing [`Model`]. Optional behavior
//! is exposed through small capability traits that a type opts into:
//!
//! - [`Properties`]: named values that can be read and overridden by path
//! - [`Dependent`]: declared link slots filled by link resolution
//! - [`Runnable`]: work performed when the enclosing simulation runs
//!
//! Marker capabilities (scope boundary, post-run tool, validation) are
//! reported through [`Model::markers`]. The tree records the full
//! [`Capabilities`] set of each node when the node is created.

use crate::error::PropertyError;
use crate::store::DataStore;
use crate::tree::{NodeId, Tree};
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;

bitflags::bitflags! {
    /// Capability set of a node's model
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Bounds visibility of its contents from sibling subtrees
        const SCOPE_BOUNDARY = 1;
        /// Exposes [`Properties`]
        const PROPERTIES = 1 << 1;
        /// Exposes [`Dependent`]
        const DEPENDENT = 1 << 2;
        /// Exposes [`Runnable`]
        const RUNNABLE = 1 << 3;
        /// Runs once after all simulations have completed
        const POST_RUN = 1 << 4;
        /// Checks results once post-run tools have finished
        const VALIDATION = 1 << 5;
    }
}

/// A value stored in a composition node
pub trait Model: ModelClone + AsAny + Debug + Send + Sync {
    /// Registry key of this model type
    fn kind(&self) -> &str;

    /// Whether this model satisfies a kind used in link or scope lookups.
    ///
    /// Defaults to a case-insensitive comparison with [`Model::kind`]; models
    /// standing in for a broader role (e.g. any weather source) override it.
    fn is_kind(&self, kind: &str) -> bool {
        self.kind().eq_ignore_ascii_case(kind)
    }

    /// Marker capabilities that have no accessor
    fn markers(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Property access, if supported
    fn properties(&self) -> Option<&dyn Properties> {
        None
    }

    /// Mutable property access, if supported
    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        None
    }

    /// Link slots, if any
    fn dependent(&self) -> Option<&dyn Dependent> {
        None
    }

    /// Mutable link slots, if any
    fn dependent_mut(&mut self) -> Option<&mut dyn Dependent> {
        None
    }

    /// Run behavior, if any
    fn runnable(&self) -> Option<&dyn Runnable> {
        None
    }
}

/// Full capability set of a model, combining markers and accessors
#[must_use]
pub fn capabilities_of(model: &dyn Model) -> Capabilities {
    let mut caps = model.markers();
    caps.set(Capabilities::PROPERTIES, model.properties().is_some());
    caps.set(Capabilities::DEPENDENT, model.dependent().is_some());
    caps.set(Capabilities::RUNNABLE, model.runnable().is_some());
    caps
}

/// Object-safe cloning for boxed models
pub trait ModelClone {
    /// Clone into a new box
    fn clone_model(&self) -> Box<dyn Model>;
}

impl<T: Model + Clone + 'static> ModelClone for T {
    fn clone_model(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

/// Downcasting support for boxed models
pub trait AsAny {
    /// View as [`Any`]
    fn as_any(&self) -> &dyn Any;

    /// View as mutable [`Any`]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.clone_model()
    }
}

/// Named, dynamically typed values of a model
pub trait Properties {
    /// Property names in declaration order
    fn property_names(&self) -> Vec<String>;

    /// Current value of a property
    fn get_property(&self, name: &str) -> Option<Value>;

    /// Replace the value of a property
    ///
    /// # Errors
    /// Returns [`PropertyError`] if the name is unknown or the value does not fit
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError>;

    /// Resolve a property name ignoring ASCII case
    fn canonical_name(&self, name: &str) -> Option<String> {
        self.property_names()
            .into_iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}

/// How a link slot finds its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStrategy {
    /// A visible node with this exact name
    ByName(String),
    /// Visible nodes of a kind, optionally filtered by name
    ByKind {
        /// Required kind
        kind: String,
        /// Optional name filter
        name: Option<String>,
    },
    /// The nearest ancestor of a kind, ignoring scope boundaries
    Ancestor {
        /// Required kind
        kind: String,
    },
    /// The nearest descendant of a kind, breadth first
    Descendant {
        /// Required kind
        kind: String,
    },
    /// A node addressed by a locator path
    ByPath(String),
}

impl std::fmt::Display for LinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByName(name) => write!(f, "node named '{name}'"),
            Self::ByKind { kind, name: None } => write!(f, "{kind}"),
            Self::ByKind {
                kind,
                name: Some(name),
            } => write!(f, "{kind} named '{name}'"),
            Self::Ancestor { kind } => write!(f, "ancestor {kind}"),
            Self::Descendant { kind } => write!(f, "descendant {kind}"),
            Self::ByPath(path) => write!(f, "node at '{path}'"),
        }
    }
}

/// A declared dependency of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSlot {
    /// Field identifier passed back to [`Dependent::bind`]
    pub field: String,
    /// Resolution strategy
    pub strategy: LinkStrategy,
    /// Missing targets are reported when set
    pub required: bool,
    /// Accepts every match instead of exactly one
    pub multiple: bool,
}

impl LinkSlot {
    fn new(field: impl Into<String>, strategy: LinkStrategy) -> Self {
        Self {
            field: field.into(),
            strategy,
            required: true,
            multiple: false,
        }
    }

    /// Link to a visible node by name
    #[must_use]
    pub fn by_name(field: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(field, LinkStrategy::ByName(name.into()))
    }

    /// Link to a visible node by kind
    #[must_use]
    pub fn by_kind(field: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(
            field,
            LinkStrategy::ByKind {
                kind: kind.into(),
                name: None,
            },
        )
    }

    /// Link to a visible node by kind and name
    #[must_use]
    pub fn by_kind_named(
        field: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            LinkStrategy::ByKind {
                kind: kind.into(),
                name: Some(name.into()),
            },
        )
    }

    /// Link to the nearest ancestor of a kind
    #[must_use]
    pub fn ancestor(field: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(field, LinkStrategy::Ancestor { kind: kind.into() })
    }

    /// Link to the nearest descendant of a kind
    #[must_use]
    pub fn descendant(field: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(field, LinkStrategy::Descendant { kind: kind.into() })
    }

    /// Link to the node at a locator path
    #[must_use]
    pub fn by_path(field: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(field, LinkStrategy::ByPath(path.into()))
    }

    /// Mark the slot optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Accept any number of targets
    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// A model that declares link slots
pub trait Dependent {
    /// Slots to fill, discovered fresh on each resolution pass
    fn link_slots(&self) -> Vec<LinkSlot>;

    /// Store resolved targets for a slot; an empty slice clears it
    fn bind(&mut self, field: &str, targets: &[NodeId]);
}

/// Execution environment handed to [`Runnable::run`]
pub trait RunContext {
    /// The tree being run
    fn tree(&self) -> &Tree;

    /// The node whose model is running
    fn node(&self) -> NodeId;

    /// Name of the simulation being run
    fn simulation_name(&self) -> &str;

    /// Read a value by locator path, relative to [`RunContext::node`]
    ///
    /// # Errors
    /// Returns an error when the path does not resolve
    fn get(&self, path: &str) -> anyhow::Result<Value>;

    /// Result sink shared by all units of a run
    fn store(&self) -> &dyn DataStore;

    /// Whether the run has been asked to stop
    fn is_cancelled(&self) -> bool;
}

/// A model that performs work when its simulation runs
pub trait Runnable {
    /// Perform this model's work
    ///
    /// # Errors
    /// Any error fails the enclosing work unit
    fn run(&self, ctx: &dyn RunContext) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Marker;

    impl Model for Marker {
        fn kind(&self) -> &str {
            "Marker"
        }

        fn markers(&self) -> Capabilities {
            Capabilities::SCOPE_BOUNDARY
        }
    }

    #[test]
    fn capabilities_include_markers() {
        let caps = capabilities_of(&Marker);
        assert!(caps.contains(Capabilities::SCOPE_BOUNDARY));
        assert!(!caps.contains(Capabilities::PROPERTIES));
        assert!(!caps.contains(Capabilities::RUNNABLE));
    }

    #[test]
    fn is_kind_ignores_case() {
        assert!(Marker.is_kind("marker"));
        assert!(!Marker.is_kind("Other"));
    }

    #[test]
    fn boxed_model_clones_and_downcasts() {
        let boxed: Box<dyn Model> = Box::new(Marker);
        let copy = boxed.clone();
        assert!(copy.as_ref().as_any().downcast_ref::<Marker>().is_some());
    }

    #[test]
    fn slot_builders() {
        let slot = LinkSlot::by_kind("clock", "Clock").optional();
        assert!(!slot.required);
        assert!(!slot.multiple);
        assert_eq!(
            slot.strategy,
            LinkStrategy::ByKind {
                kind: "Clock".into(),
                name: None
            }
        );

        let slot = LinkSlot::descendant("reports", "Report").multiple();
        assert!(slot.required);
        assert!(slot.multiple);
    }
}
