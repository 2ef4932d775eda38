//! Scope resolution
//!
//! The visible set of a node depends only on its nearest scope boundary
//! (the first ancestor-or-self whose model is a boundary, or the root).
//! Results are memoized per boundary.
//!
//! The cache is stamped with the tree identity and structural version it was
//! filled from. Any mismatch clears the whole cache: an edit anywhere can
//! change which nodes are boundaries for unrelated parts of the tree.

use canopy_tree::{NodeId, Tree, TreeId};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered set of nodes visible from one scope boundary
pub type VisibleSet = Arc<IndexSet<NodeId>>;

#[derive(Debug, Default)]
struct ScopeCache {
    stamp: Option<(TreeId, u64)>,
    entries: HashMap<NodeId, VisibleSet>,
}

/// Memoizing scope resolver
///
/// One resolver may be shared between threads reading the same tree.
#[derive(Debug, Default)]
pub struct ScopeResolver {
    cache: Mutex<ScopeCache>,
}

impl ScopeResolver {
    /// Create a resolver with an empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Nearest scope boundary of `node`: itself, an ancestor, or the root
    #[must_use]
    pub fn scope_boundary_of(tree: &Tree, node: NodeId) -> NodeId {
        std::iter::once(node)
            .chain(tree.ancestors(node))
            .find(|&id| tree.get(id).is_some_and(|n| n.is_scope_boundary()))
            .unwrap_or_else(|| tree.root())
    }

    /// Nodes visible to `node`, in discovery order
    ///
    /// Returns an empty set for ids that are not live in `tree`.
    pub fn visible_nodes_of(&self, tree: &Tree, node: NodeId) -> VisibleSet {
        if !tree.contains(node) {
            return VisibleSet::default();
        }
        let boundary = Self::scope_boundary_of(tree, node);

        let mut cache = self.cache.lock();
        let stamp = (tree.tree_id(), tree.version());
        if cache.stamp != Some(stamp) {
            if cache.stamp.is_some() {
                tracing::trace!(entries = cache.entries.len(), "scope cache invalidated");
            }
            cache.entries.clear();
            cache.stamp = Some(stamp);
        }

        Arc::clone(
            cache
                .entries
                .entry(boundary)
                .or_insert_with(|| Arc::new(compute_visible(tree, boundary))),
        )
    }

    /// Whether `candidate` is visible to `relative_to`
    pub fn is_visible(&self, tree: &Tree, candidate: NodeId, relative_to: NodeId) -> bool {
        self.visible_nodes_of(tree, relative_to).contains(&candidate)
    }

    /// First visible node with `name`, excluding `relative_to` itself
    pub fn find_in_scope(&self, tree: &Tree, relative_to: NodeId, name: &str) -> Option<NodeId> {
        self.visible_nodes_of(tree, relative_to)
            .iter()
            .copied()
            .filter(|&id| id != relative_to)
            .find(|&id| tree[id].name().eq_ignore_ascii_case(name))
    }

    /// Visible nodes whose model satisfies `kind`, excluding `relative_to`
    pub fn find_all_of_kind(&self, tree: &Tree, relative_to: NodeId, kind: &str) -> Vec<NodeId> {
        self.visible_nodes_of(tree, relative_to)
            .iter()
            .copied()
            .filter(|&id| id != relative_to && tree[id].model().is_kind(kind))
            .collect()
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.stamp = None;
    }

    /// Number of boundaries currently cached
    #[must_use]
    pub fn cached_boundaries(&self) -> usize {
        self.cache.lock().entries.len()
    }
}

fn compute_visible(tree: &Tree, boundary: NodeId) -> IndexSet<NodeId> {
    let mut visible: IndexSet<NodeId> = tree.walk(boundary).collect();

    let mut came_from = boundary;
    for ancestor in tree.ancestors(boundary) {
        visible.insert(ancestor);
        for &sibling in tree.children(ancestor) {
            if sibling == came_from {
                continue;
            }
            visible.insert(sibling);
            if !tree[sibling].is_scope_boundary() {
                visible.extend(tree.descendants(sibling));
            }
        }
        came_from = ancestor;
    }
    visible
}
