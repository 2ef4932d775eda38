//! Loading trees from JSON descriptions

use crate::error::{CoreError, Result};
use canopy_tree::{Tree, TreeDescription, TypeRegistry};
use std::path::Path;

/// Parse a [`TreeDescription`] from a JSON file
///
/// # Errors
/// [`CoreError::Io`] or [`CoreError::Description`]
pub fn load_description(path: impl AsRef<Path>) -> Result<TreeDescription> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CoreError::Description {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the tree described in a JSON file
///
/// # Errors
/// As [`load_description`], plus [`CoreError::Tree`] for the first node that
/// cannot be built
pub fn load_tree(path: impl AsRef<Path>, registry: &TypeRegistry) -> Result<Tree> {
    let path = path.as_ref();
    let tree = load_description(path)?.build(registry)?;
    tracing::debug!(path = %path.display(), nodes = tree.node_count(), "tree loaded");
    Ok(tree)
}
