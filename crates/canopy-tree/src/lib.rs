//! Canopy composition tree
//!
//! Ownership hierarchy of model values, backed by an index arena.
//!
//! # Overview
//!
//! - **Tree**: arena of [`Node`]s addressed by [`NodeId`], with parent indices
//!   and derived full paths
//! - **Model**: capability traits a payload implements à la carte
//!   ([`Properties`], [`Dependent`], [`Runnable`])
//! - **TypeRegistry**: explicit kind → factory map used by
//!   [`TreeDescription::build`]
//! - **AdaptedValue**: plain JSON payloads with a discovery function
//!
//! # Example
//!
//! ```rust
//! use canopy_tree::{Model, Tree};
//!
//! #[derive(Debug, Clone)]
//! struct Folder;
//!
//! impl Model for Folder {
//!     fn kind(&self) -> &str {
//!         "Folder"
//!     }
//! }
//!
//! let mut tree = Tree::new("Root", Box::new(Folder));
//! let a = tree.add_child(tree.root(), "A", Box::new(Folder)).unwrap();
//! let leaf = tree.add_child(a, "Leaf", Box::new(Folder)).unwrap();
//! assert_eq!(tree.path_of(leaf), "Root.A.Leaf");
//! ```

#![warn(missing_docs)]

pub mod adapted;
pub mod description;
pub mod error;
pub mod model;
pub mod props;
pub mod registry;
pub mod store;
pub mod tree;

// Re-exports
pub use adapted::{discover_nested, AdaptedValue, Discovered, Discovery};
pub use description::TreeDescription;
pub use error::{PropertyError, TreeError};
pub use model::{
    capabilities_of, AsAny, Capabilities, Dependent, LinkSlot, LinkStrategy, Model, ModelClone,
    Properties, RunContext, Runnable,
};
pub use registry::{Factory, TypeRegistry};
pub use store::{DataStore, Row, Table, SIMULATION_NAME_COLUMN};
pub use tree::{Ancestors, Node, NodeId, PreOrder, Tree, TreeId};

#[doc(hidden)]
pub mod __private {
    pub use serde_json::{from_value, to_value, Value};
}

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and inspecting trees
    pub use crate::{
        Capabilities, Dependent, LinkSlot, Model, Node, NodeId, Properties, PropertyError,
        RunContext, Runnable, Tree, TreeDescription, TreeError, TypeRegistry,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
