//! Arena-backed composition tree
//!
//! Nodes live in a single `Vec` owned by the [`Tree`]. Ownership is the
//! `children` list of each node; the parent link is a plain index used for
//! lookups only, so the ownership relation can never form a cycle.
//!
//! Slots of removed nodes are never reused. A stale [`NodeId`] therefore
//! resolves to `None` instead of silently pointing at a different node.
//! A tree that is edited repeatedly keeps its vacant slots; `subtree` of the
//! root yields a compact copy.
//!
//! Every structural edit bumps [`Tree::version`]. Caches derived from the
//! shape of a tree (scope sets) compare `(tree_id, version)` to detect that
//! they are out of date.

use crate::error::TreeError;
use crate::model::{capabilities_of, Capabilities, Model};
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a node within its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of a [`Tree`] instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node of the composition tree
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    full_path: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    model: Box<dyn Model>,
    capabilities: Capabilities,
}

impl Node {
    fn new(name: String, model: Box<dyn Model>) -> Self {
        let capabilities = capabilities_of(model.as_ref());
        Self {
            full_path: name.clone(),
            name,
            parent: None,
            children: Vec::new(),
            model,
            capabilities,
        }
    }

    /// Node name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dot-separated path from the root, starting with the root's name
    #[inline]
    #[must_use]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Owning node, `None` for the root
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Owned children in order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The model value
    #[inline]
    #[must_use]
    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// The model value, mutably
    #[inline]
    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }

    /// Kind of the model value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        self.model.kind()
    }

    /// Capabilities recorded when the node was created
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether the model bounds scope
    #[inline]
    #[must_use]
    pub fn is_scope_boundary(&self) -> bool {
        self.capabilities.contains(Capabilities::SCOPE_BOUNDARY)
    }
}

/// Ownership tree of model values
#[derive(Debug)]
pub struct Tree {
    id: TreeId,
    version: u64,
    root: NodeId,
    nodes: Vec<Option<Node>>,
}

impl Clone for Tree {
    /// Deep copy with a fresh [`TreeId`]
    fn clone(&self) -> Self {
        Self {
            id: TreeId::next(),
            version: self.version,
            root: self.root,
            nodes: self.nodes.clone(),
        }
    }
}

impl Tree {
    /// Create a tree holding a single root node
    #[must_use]
    pub fn new(name: impl Into<String>, model: Box<dyn Model>) -> Self {
        Self {
            id: TreeId::next(),
            version: 0,
            root: NodeId(0),
            nodes: vec![Some(Node::new(name.into(), model))],
        }
    }

    /// Identity of this tree instance
    #[inline]
    #[must_use]
    pub fn tree_id(&self) -> TreeId {
        self.id
    }

    /// Structural version, bumped on every edit
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether `id` refers to a live node
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a node
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Look up a node mutably; only the model can be changed through it
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Model value of a node
    #[inline]
    #[must_use]
    pub fn model(&self, id: NodeId) -> Option<&dyn Model> {
        self.get(id).map(Node::model)
    }

    /// Mutable model value of a node
    #[inline]
    pub fn model_mut(&mut self, id: NodeId) -> Option<&mut dyn Model> {
        self.get_mut(id).map(Node::model_mut)
    }

    /// Parent of a node
    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Children of a node, empty for unknown ids
    #[inline]
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or_default()
    }

    /// Walk `id` and its descendants in pre-order
    #[must_use]
    pub fn walk(&self, id: NodeId) -> PreOrder<'_> {
        let stack = if self.contains(id) { vec![id] } else { Vec::new() };
        PreOrder { tree: self, stack }
    }

    /// Descendants of `id` in pre-order, excluding `id`
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> PreOrder<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        PreOrder { tree: self, stack }
    }

    /// Ancestors of `id`, nearest first, excluding `id`
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Full path of a node, or an empty string for unknown ids
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> &str {
        self.get(id).map_or("", Node::full_path)
    }

    /// Append a new child created from `model`
    ///
    /// # Errors
    /// [`TreeError::NodeNotFound`] if `parent` is not live
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        model: Box<dyn Model>,
    ) -> Result<NodeId, TreeError> {
        let len = self.live(parent)?.children.len();
        self.insert_child(parent, len, name, model)
    }

    /// Insert a new child at `position` among the parent's children
    ///
    /// # Errors
    /// [`TreeError::NodeNotFound`] or [`TreeError::PositionOutOfRange`]
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        position: usize,
        name: impl Into<String>,
        model: Box<dyn Model>,
    ) -> Result<NodeId, TreeError> {
        self.check_position(parent, position)?;
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(name.into(), model);
        node.parent = Some(parent);
        self.nodes.push(Some(node));
        self.live_mut(parent)?.children.insert(position, id);
        self.refresh_paths(id);
        self.touch();
        Ok(id)
    }

    /// Re-parent existing nodes under `parent`, appended in the given order
    ///
    /// Each moved node keeps its own subtree; full paths are recomputed for
    /// the node and all of its descendants.
    ///
    /// # Errors
    /// Fails without changing anything if a node is missing, is the root, or
    /// is an ancestor of `parent`.
    pub fn add_children(&mut self, parent: NodeId, children: &[NodeId]) -> Result<(), TreeError> {
        self.live(parent)?;
        for &child in children {
            self.check_movable(child, parent)?;
        }
        for &child in children {
            let len = self.live(parent)?.children.len();
            self.relink(child, parent, len)?;
        }
        if !children.is_empty() {
            self.touch();
        }
        Ok(())
    }

    /// Move `node` under `new_parent` at `position`
    ///
    /// # Errors
    /// Same conditions as [`Tree::add_children`], plus
    /// [`TreeError::PositionOutOfRange`]
    pub fn move_node(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        position: usize,
    ) -> Result<(), TreeError> {
        self.check_movable(node, new_parent)?;
        let same_parent = self.parent(node) == Some(new_parent);
        let len = self.live(new_parent)?.children.len();
        let max = if same_parent { len - 1 } else { len };
        if position > max {
            return Err(TreeError::PositionOutOfRange {
                parent: self.path_of(new_parent).to_string(),
                position,
                len: max,
            });
        }
        self.relink(node, new_parent, position)?;
        self.touch();
        Ok(())
    }

    /// Move another tree's nodes under `parent` at `position`
    ///
    /// Returns the id the grafted root received in this tree.
    ///
    /// # Errors
    /// [`TreeError::NodeNotFound`] or [`TreeError::PositionOutOfRange`]
    pub fn graft(
        &mut self,
        parent: NodeId,
        position: usize,
        subtree: Tree,
    ) -> Result<NodeId, TreeError> {
        self.check_position(parent, position)?;
        let Tree {
            root, mut nodes, ..
        } = subtree;
        let id = transplant(&mut nodes, root, &mut self.nodes, Some(parent))
            .ok_or(TreeError::NodeNotFound(root))?;
        self.live_mut(parent)?.children.insert(position, id);
        self.refresh_paths(id);
        self.touch();
        Ok(id)
    }

    /// Detach a subtree and return it as a standalone tree
    ///
    /// # Errors
    /// [`TreeError::RootIsFixed`] for the root, [`TreeError::NodeNotFound`]
    /// for stale ids
    pub fn remove(&mut self, id: NodeId) -> Result<Tree, TreeError> {
        let parent = self.live(id)?.parent.ok_or(TreeError::RootIsFixed)?;
        self.live_mut(parent)?.children.retain(|&c| c != id);

        let mut nodes = Vec::new();
        let root =
            transplant(&mut self.nodes, id, &mut nodes, None).ok_or(TreeError::NodeNotFound(id))?;
        let mut detached = Tree {
            id: TreeId::next(),
            version: 0,
            root,
            nodes,
        };
        detached.refresh_paths(root);
        self.touch();
        Ok(detached)
    }

    /// Swap the subtree at `id` for `replacement`, keeping its position
    ///
    /// Returns the new node id and the detached original subtree.
    ///
    /// # Errors
    /// Same as [`Tree::remove`]
    pub fn replace(&mut self, id: NodeId, replacement: Tree) -> Result<(NodeId, Tree), TreeError> {
        let parent = self.live(id)?.parent.ok_or(TreeError::RootIsFixed)?;
        let position = self
            .children(parent)
            .iter()
            .position(|&c| c == id)
            .ok_or(TreeError::NodeNotFound(id))?;
        let original = self.remove(id)?;
        let new_id = self.graft(parent, position, replacement)?;
        Ok((new_id, original))
    }

    /// Rename a node, updating its descendants' paths
    ///
    /// # Errors
    /// [`TreeError::NodeNotFound`] for stale ids
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), TreeError> {
        self.live_mut(id)?.name = name.into();
        self.refresh_paths(id);
        self.touch();
        Ok(())
    }

    /// Copy the subtree at `id` into a standalone tree
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Option<Tree> {
        let mut nodes = Vec::new();
        let root = copy_into(self, id, &mut nodes, None)?;
        let mut copy = Tree {
            id: TreeId::next(),
            version: 0,
            root,
            nodes,
        };
        copy.refresh_paths(root);
        Some(copy)
    }

    /// Child positions leading from the root to `id`
    ///
    /// Unlike a [`NodeId`], a position path survives a subtree being
    /// detached and grafted back at the same place.
    #[must_use]
    pub fn position_path(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut positions = Vec::new();
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent {
            let index = self.children(parent).iter().position(|&c| c == current)?;
            positions.push(index);
            current = parent;
        }
        positions.reverse();
        Some(positions)
    }

    /// Node reached by following child positions from the root
    #[must_use]
    pub fn node_at_position(&self, positions: &[usize]) -> Option<NodeId> {
        positions
            .iter()
            .try_fold(self.root, |at, &i| self.children(at).get(i).copied())
    }

    /// Find a node by path or name
    ///
    /// - `.Root.A.B` is absolute; the first segment must name the root
    /// - `A.B` walks children starting at `relative_to`
    /// - a bare name matches a direct child of `relative_to`, or with
    ///   `recursive` the first descendant in pre-order
    ///
    /// Names compare ignoring ASCII case.
    #[must_use]
    pub fn find(&self, path: &str, relative_to: NodeId, recursive: bool) -> Option<NodeId> {
        if let Some(absolute) = path.strip_prefix('.') {
            let mut segments = absolute.split('.');
            let root_name = segments.next()?;
            let root = self.get(self.root)?;
            if !root.name.eq_ignore_ascii_case(root_name) {
                return None;
            }
            return segments.try_fold(self.root, |at, seg| self.child_by_name(at, seg));
        }

        if path.contains('.') {
            return path
                .split('.')
                .try_fold(relative_to, |at, seg| self.child_by_name(at, seg));
        }

        if recursive {
            self.descendants(relative_to)
                .find(|&id| self.name_matches(id, path))
        } else {
            self.child_by_name(relative_to, path)
        }
    }

    /// First direct child with the given name
    #[must_use]
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.name_matches(c, name))
    }

    fn name_matches(&self, id: NodeId, name: &str) -> bool {
        self.get(id)
            .is_some_and(|n| n.name.eq_ignore_ascii_case(name))
    }

    fn live(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get(id).ok_or(TreeError::NodeNotFound(id))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.get_mut(id).ok_or(TreeError::NodeNotFound(id))
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    fn check_position(&self, parent: NodeId, position: usize) -> Result<(), TreeError> {
        let len = self.live(parent)?.children.len();
        if position > len {
            return Err(TreeError::PositionOutOfRange {
                parent: self.path_of(parent).to_string(),
                position,
                len,
            });
        }
        Ok(())
    }

    fn check_movable(&self, node: NodeId, new_parent: NodeId) -> Result<(), TreeError> {
        self.live(new_parent)?;
        if self.live(node)?.parent.is_none() {
            return Err(TreeError::RootIsFixed);
        }
        if self.is_ancestor_or_self(node, new_parent) {
            return Err(TreeError::WouldCreateCycle {
                node: self.path_of(node).to_string(),
                new_parent: self.path_of(new_parent).to_string(),
            });
        }
        Ok(())
    }

    fn relink(&mut self, node: NodeId, new_parent: NodeId, position: usize) -> Result<(), TreeError> {
        if let Some(old_parent) = self.live(node)?.parent {
            self.live_mut(old_parent)?.children.retain(|&c| c != node);
        }
        let siblings = &mut self.live_mut(new_parent)?.children;
        let position = position.min(siblings.len());
        siblings.insert(position, node);
        self.live_mut(node)?.parent = Some(new_parent);
        self.refresh_paths(node);
        Ok(())
    }

    /// Recompute full paths for `id` and everything below it
    fn refresh_paths(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let prefix = self
                .parent(current)
                .map(|p| self.path_of(p).to_string());
            if let Some(node) = self.get_mut(current) {
                node.full_path = match prefix {
                    Some(prefix) => format!("{prefix}.{}", node.name),
                    None => node.name.clone(),
                };
                stack.extend(node.children.iter().copied());
            }
        }
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    /// # Panics
    /// Panics if `id` does not refer to a live node; use [`Tree::get`] to
    /// probe.
    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id} is not part of this tree"),
        }
    }
}

/// Move the subtree at `from` out of `src` and append it to `dst`
fn transplant(
    src: &mut [Option<Node>],
    from: NodeId,
    dst: &mut Vec<Option<Node>>,
    parent: Option<NodeId>,
) -> Option<NodeId> {
    let mut node = src.get_mut(from.index())?.take()?;
    let old_children = std::mem::take(&mut node.children);
    node.parent = parent;
    let id = NodeId(dst.len());
    dst.push(Some(node));

    let children: Vec<NodeId> = old_children
        .into_iter()
        .filter_map(|child| transplant(src, child, dst, Some(id)))
        .collect();
    if let Some(Some(node)) = dst.get_mut(id.index()) {
        node.children = children;
    }
    Some(id)
}

/// Deep-copy the subtree at `from` into `dst`
fn copy_into(
    tree: &Tree,
    from: NodeId,
    dst: &mut Vec<Option<Node>>,
    parent: Option<NodeId>,
) -> Option<NodeId> {
    let source = tree.get(from)?;
    let mut node = source.clone();
    node.children.clear();
    node.parent = parent;
    let id = NodeId(dst.len());
    dst.push(Some(node));

    let children: Vec<NodeId> = source
        .children
        .iter()
        .filter_map(|&child| copy_into(tree, child, dst, Some(id)))
        .collect();
    if let Some(Some(node)) = dst.get_mut(id.index()) {
        node.children = children;
    }
    Some(id)
}

/// Pre-order traversal, see [`Tree::walk`]
#[derive(Debug)]
pub struct PreOrder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for PreOrder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Ancestor chain, see [`Tree::ancestors`]
#[derive(Debug)]
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.parent(id);
        Some(id)
    }
}
