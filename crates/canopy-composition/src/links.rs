//! Link resolution
//!
//! Fills the declared [`LinkSlot`]s of every dependent model. Name and kind
//! lookups search the scope of the dependent node; ancestor and descendant
//! lookups follow the tree directly and ignore scope boundaries.
//!
//! Resolution runs in two passes: targets are computed against an immutable
//! tree, then bound. Slots are rediscovered on every call, so resolving an
//! already resolved tree again rebinds the same targets.

use canopy_scope::{Locator, ScopeResolver};
use canopy_tree::{Capabilities, LinkSlot, LinkStrategy, NodeId, Tree};
use std::collections::VecDeque;

/// A slot that could not be filled
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// A required slot matched nothing
    #[error("{node}: cannot find {wanted} for link '{field}'")]
    MissingDependency {
        /// Full path of the dependent node
        node: String,
        /// Slot field
        field: String,
        /// What the slot was looking for
        wanted: String,
    },

    /// A single-target slot matched several nodes
    #[error("{node}: link '{field}' to {wanted} is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousDependency {
        /// Full path of the dependent node
        node: String,
        /// Slot field
        field: String,
        /// What the slot was looking for
        wanted: String,
        /// Full paths of every match
        candidates: Vec<String>,
    },
}

impl LinkError {
    /// Full path of the node whose slot failed
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::MissingDependency { node, .. } | Self::AmbiguousDependency { node, .. } => node,
        }
    }
}

struct Binding {
    node: NodeId,
    field: String,
    targets: Vec<NodeId>,
}

/// Wires dependency slots to nodes
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkResolver {
    locator: Locator,
}

impl LinkResolver {
    /// Create a resolver with a case-insensitive locator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `locator` for path-based slots
    #[inline]
    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    /// Resolve every slot in the tree
    ///
    /// Returns every failure when `fail_fast` is false. Slots that resolve
    /// are bound either way; failing slots are left unbound.
    ///
    /// # Errors
    /// With `fail_fast`, the first failure aborts resolution before anything
    /// is bound
    pub fn resolve(
        &self,
        tree: &mut Tree,
        scope: &ScopeResolver,
        fail_fast: bool,
    ) -> Result<Vec<LinkError>, LinkError> {
        let root = tree.root();
        self.resolve_from(tree, scope, root, fail_fast)
    }

    /// Resolve slots of `start` and its descendants
    ///
    /// # Errors
    /// See [`LinkResolver::resolve`]
    pub fn resolve_from(
        &self,
        tree: &mut Tree,
        scope: &ScopeResolver,
        start: NodeId,
        fail_fast: bool,
    ) -> Result<Vec<LinkError>, LinkError> {
        let mut bindings = Vec::new();
        let mut errors = Vec::new();

        for node in tree.walk(start) {
            if !tree[node].capabilities().contains(Capabilities::DEPENDENT) {
                continue;
            }
            let Some(slots) = tree[node].model().dependent().map(|d| d.link_slots()) else {
                continue;
            };
            for slot in slots {
                match self.resolve_slot(tree, scope, node, &slot) {
                    Ok(targets) => bindings.push(Binding {
                        node,
                        field: slot.field,
                        targets,
                    }),
                    Err(err) if fail_fast => return Err(err),
                    Err(err) => {
                        tracing::debug!(error = %err, "unresolved link");
                        errors.push(err);
                    }
                }
            }
        }

        let bound = bindings.len();
        for binding in bindings {
            if let Some(dependent) = tree.model_mut(binding.node).and_then(|m| m.dependent_mut()) {
                dependent.bind(&binding.field, &binding.targets);
            }
        }
        tracing::debug!(bound, failed = errors.len(), "links resolved");
        Ok(errors)
    }

    fn resolve_slot(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        node: NodeId,
        slot: &LinkSlot,
    ) -> Result<Vec<NodeId>, LinkError> {
        let matches = self.candidates(tree, scope, node, slot);
        let wanted = || slot.strategy.to_string();

        match matches.len() {
            0 if slot.required => Err(LinkError::MissingDependency {
                node: tree.path_of(node).to_string(),
                field: slot.field.clone(),
                wanted: wanted(),
            }),
            n if n > 1 && !slot.multiple => Err(LinkError::AmbiguousDependency {
                node: tree.path_of(node).to_string(),
                field: slot.field.clone(),
                wanted: wanted(),
                candidates: matches.iter().map(|&m| tree.path_of(m).to_string()).collect(),
            }),
            _ => Ok(matches),
        }
    }

    fn candidates(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        node: NodeId,
        slot: &LinkSlot,
    ) -> Vec<NodeId> {
        match &slot.strategy {
            LinkStrategy::ByName(name) => in_scope(tree, scope, node, |id| {
                tree[id].name().eq_ignore_ascii_case(name)
            }),
            LinkStrategy::ByKind { kind, name } => in_scope(tree, scope, node, |id| {
                tree[id].model().is_kind(kind)
                    && name
                        .as_deref()
                        .map_or(true, |n| tree[id].name().eq_ignore_ascii_case(n))
            }),
            LinkStrategy::Ancestor { kind } => tree
                .ancestors(node)
                .find(|&id| tree[id].model().is_kind(kind))
                .into_iter()
                .collect(),
            LinkStrategy::Descendant { kind } => nearest_descendants(tree, node, kind, slot.multiple),
            LinkStrategy::ByPath(path) => self
                .locator
                .find_node(tree, scope, node, path)
                .ok()
                .into_iter()
                .collect(),
        }
    }
}

fn in_scope(
    tree: &Tree,
    scope: &ScopeResolver,
    node: NodeId,
    predicate: impl Fn(NodeId) -> bool,
) -> Vec<NodeId> {
    scope
        .visible_nodes_of(tree, node)
        .iter()
        .copied()
        .filter(|&id| id != node && predicate(id))
        .collect()
}

/// Breadth-first search for descendants of `kind`
///
/// A single-target slot takes every match at the shallowest depth (more
/// than one is ambiguous); a multi-target slot takes all matches.
fn nearest_descendants(tree: &Tree, node: NodeId, kind: &str, all: bool) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut found_depth = None;
    let mut queue: VecDeque<(NodeId, usize)> =
        tree.children(node).iter().map(|&c| (c, 1)).collect();

    while let Some((id, depth)) = queue.pop_front() {
        if !all && found_depth.is_some_and(|d| depth > d) {
            break;
        }
        if tree[id].model().is_kind(kind) {
            found.push(id);
            found_depth.get_or_insert(depth);
        }
        queue.extend(tree.children(id).iter().map(|&c| (c, depth + 1)));
    }
    found
}
