//! Error types for tree construction and editing

use crate::tree::NodeId;

/// Errors raised while building or structurally editing a [`Tree`](crate::Tree)
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// No factory or adapter is registered for the requested kind
    #[error("unknown node kind: {kind}")]
    UnknownNodeKind {
        /// The kind that was requested
        kind: String,
    },

    /// Node id does not refer to a live node of this tree
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The root cannot be detached or re-parented
    #[error("the root node cannot be removed or moved")]
    RootIsFixed,

    /// Re-parenting would make a node its own ancestor
    #[error("moving '{node}' under '{new_parent}' would create an ownership cycle")]
    WouldCreateCycle {
        /// Full path of the node being moved
        node: String,
        /// Full path of the requested new parent
        new_parent: String,
    },

    /// Child position is past the end of the parent's child list
    #[error("position {position} is out of range for '{parent}' ({len} children)")]
    PositionOutOfRange {
        /// Full path of the parent
        parent: String,
        /// Requested position
        position: usize,
        /// Current number of children
        len: usize,
    },

    /// Assigning a property failed while building a node
    #[error("cannot set property on '{node}': {source}")]
    Property {
        /// Full path of the node
        node: String,
        /// Underlying property failure
        #[source]
        source: PropertyError,
    },
}

/// Errors raised when reading or writing a model property
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// The model has no property with this name
    #[error("unknown property: {name}")]
    Unknown {
        /// Property name
        name: String,
    },

    /// The model does not expose settable properties
    #[error("model of kind '{kind}' has no settable properties")]
    NotSettable {
        /// Kind of the model
        kind: String,
    },

    /// The value could not be converted to the property's type
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Property name
        name: String,
        /// Conversion failure
        reason: String,
    },
}
