//! Path location errors

use canopy_tree::PropertyError;

/// Errors raised while resolving a locator path
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocateError {
    /// Nothing to resolve
    #[error("empty path")]
    EmptyPath,

    /// A `[` without a matching `]`
    #[error("no closing square bracket in '{path}'")]
    UnclosedBracket {
        /// The offending path
        path: String,
    },

    /// An absolute path named something other than the root
    #[error("incorrect root name in absolute path '{path}'")]
    WrongRoot {
        /// The offending path
        path: String,
    },

    /// No node with the bracketed name or kind is in scope
    #[error("unable to find any node with name or kind '{name}' in scope of '{relative_to}'")]
    NotInScope {
        /// Bracketed name
        name: String,
        /// Full path of the node the lookup started from
        relative_to: String,
    },

    /// A path segment matched no property, child or field
    #[error("while locating '{path}': unknown node or property '{segment}'")]
    UnknownSegment {
        /// The full path
        path: String,
        /// Segment that failed
        segment: String,
    },

    /// An array specifier was malformed or out of range
    #[error("while locating '{path}': bad array index '{index}'")]
    BadIndex {
        /// The full path
        path: String,
        /// Raw specifier
        index: String,
    },

    /// The path ends at a node where a value was required
    #[error("'{path}' refers to a node, not a value")]
    NotAValue {
        /// The full path
        path: String,
    },

    /// The path cannot be written to
    #[error("'{path}' is not settable")]
    NotSettable {
        /// The full path
        path: String,
    },

    /// The model rejected a property access
    #[error("while setting '{path}': {source}")]
    Property {
        /// The full path
        path: String,
        /// Underlying failure
        #[source]
        source: PropertyError,
    },
}
