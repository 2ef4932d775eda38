//! Canopy scoping
//!
//! Determines which nodes of a composition tree are visible to each other and
//! resolves textual paths to nodes and property values.
//!
//! # Overview
//!
//! - **ScopeResolver**: visible set per scope boundary, memoized and cleared
//!   wholesale whenever the tree's structure changes
//! - **Locator**: `.Root.A.Prop`, `[Name].Prop`, `Child.Prop[2]` style paths
//!
//! # Example
//!
//! ```rust
//! use canopy_scope::ScopeResolver;
//! use canopy_tree::{Capabilities, Model, Tree};
//!
//! #[derive(Debug, Clone)]
//! struct Unit;
//!
//! impl Model for Unit {
//!     fn kind(&self) -> &str {
//!         "Unit"
//!     }
//!
//!     fn markers(&self) -> Capabilities {
//!         Capabilities::SCOPE_BOUNDARY
//!     }
//! }
//!
//! let mut tree = Tree::new("Root", Box::new(Unit));
//! let a = tree.add_child(tree.root(), "A", Box::new(Unit)).unwrap();
//! let b = tree.add_child(tree.root(), "B", Box::new(Unit)).unwrap();
//! let hidden = tree.add_child(b, "Hidden", Box::new(Unit)).unwrap();
//!
//! let scope = ScopeResolver::new();
//! assert!(scope.is_visible(&tree, b, a));
//! assert!(!scope.is_visible(&tree, hidden, a));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod locator;
pub mod resolver;

// Re-exports
pub use error::LocateError;
pub use locator::{Location, Locator, PropertyPath, Step};
pub use resolver::{ScopeResolver, VisibleSet};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for scope queries
    pub use crate::{LocateError, Location, Locator, ScopeResolver};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
