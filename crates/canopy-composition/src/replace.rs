//! Reversible overrides
//!
//! An override either sets a property reached by a locator path or swaps a
//! whole subtree. A property override broadcasts: a bracketed name such as
//! `[Leaf].Area` writes every same-named node in scope. A subtree override
//! replaces only the first node matched in pre-order.
//!
//! Application is all or nothing. When any override fails, the ones already
//! applied are undone before the error is returned.

use canopy_scope::{Location, Locator, PropertyPath, ScopeResolver};
use canopy_tree::{NodeId, Tree, TreeError};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Errors raised while applying or undoing overrides
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    /// An override matched nothing
    #[error("unable to apply override '{path}': {reason}")]
    UnresolvedOverridePath {
        /// Path or subtree matcher that failed
        path: String,
        /// Why resolution failed
        reason: String,
    },

    /// `+=` or `-=` used on a value that is not a list
    #[error("'{path}' is not a list; cannot use '{op}'")]
    NotAList {
        /// Property path
        path: String,
        /// Operator used
        op: OverrideOp,
    },

    /// The target model rejected the value
    #[error("cannot set '{path}'")]
    Rejected {
        /// Property path
        path: String,
        /// Underlying failure
        #[source]
        source: canopy_scope::LocateError,
    },

    /// A structural edit failed
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Textual override could not be parsed
    #[error("invalid override '{text}': expected path=value, path+=value or path-=value")]
    Parse {
        /// The text as given
        text: String,
    },
}

/// How a property override combines with the current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideOp {
    /// Replace the value
    #[default]
    Assign,
    /// Append to a list, replacing an entry with the same `key=` prefix
    Append,
    /// Remove matching list entries
    Remove,
}

impl fmt::Display for OverrideOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assign => "=",
            Self::Append => "+=",
            Self::Remove => "-=",
        })
    }
}

/// A pre-run change to a composed tree
#[derive(Debug, Clone)]
pub enum Override {
    /// Set a property at every location a path matches
    Property {
        /// Locator path
        path: String,
        /// Combination rule
        op: OverrideOp,
        /// New value or list operand
        value: Value,
    },
    /// Replace the first node matching a name and optional kind
    Subtree {
        /// Name to match
        name: String,
        /// Kind to match, if any
        kind: Option<String>,
        /// Tree grafted in place of the match
        replacement: Tree,
    },
}

impl Override {
    /// Assign `value` at `path`
    #[must_use]
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Property {
            path: path.into(),
            op: OverrideOp::Assign,
            value,
        }
    }

    /// Append `value` to the list at `path`
    #[must_use]
    pub fn append(path: impl Into<String>, value: Value) -> Self {
        Self::Property {
            path: path.into(),
            op: OverrideOp::Append,
            value,
        }
    }

    /// Remove `value` from the list at `path`
    #[must_use]
    pub fn remove(path: impl Into<String>, value: Value) -> Self {
        Self::Property {
            path: path.into(),
            op: OverrideOp::Remove,
            value,
        }
    }

    /// Replace the first node named `name` with `replacement`
    #[must_use]
    pub fn subtree(name: impl Into<String>, kind: Option<&str>, replacement: Tree) -> Self {
        Self::Subtree {
            name: name.into(),
            kind: kind.map(str::to_string),
            replacement,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Property { path, op, .. } => format!("{path}{op}"),
            Self::Subtree { name, .. } => name.clone(),
        }
    }
}

/// Parses `path=value`, `path+=value` and `path-=value`
///
/// The value is read as JSON when it parses, otherwise as a string.
impl FromStr for Override {
    type Err = OverrideError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parse_error = || OverrideError::Parse {
            text: text.to_string(),
        };
        let eq = text.find('=').ok_or_else(parse_error)?;
        let (lhs, rhs) = (&text[..eq], text[eq + 1..].trim());
        let (path, op) = if let Some(path) = lhs.strip_suffix('+') {
            (path, OverrideOp::Append)
        } else if let Some(path) = lhs.strip_suffix('-') {
            (path, OverrideOp::Remove)
        } else {
            (lhs, OverrideOp::Assign)
        };
        let path = path.trim();
        if path.is_empty() {
            return Err(parse_error());
        }
        let value = serde_json::from_str(rhs).unwrap_or_else(|_| Value::String(rhs.to_string()));
        Ok(Self::Property {
            path: path.to_string(),
            op,
            value,
        })
    }
}

#[derive(Debug)]
enum UndoEntry {
    Property {
        at: Vec<usize>,
        path: String,
        property: PropertyPath,
        previous: Value,
    },
    Subtree {
        at: Vec<usize>,
        original: Tree,
    },
}

/// Record of applied overrides, consumed by [`ReplacementEngine::undo`]
#[derive(Debug, Default)]
#[must_use = "dropping the handle discards the ability to undo"]
pub struct AppliedOverrides {
    entries: Vec<UndoEntry>,
}

impl AppliedOverrides {
    /// Number of individual writes and swaps recorded
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Applies and reverts overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacementEngine {
    locator: Locator,
}

impl ReplacementEngine {
    /// Create an engine with a case-insensitive locator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `locator` to resolve property paths
    #[inline]
    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    /// Apply `overrides` in order, relative to `relative_to`
    ///
    /// # Errors
    /// The first failing override; every earlier change has been reverted
    pub fn apply(
        &self,
        tree: &mut Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        overrides: &[Override],
    ) -> Result<AppliedOverrides, OverrideError> {
        let mut applied = AppliedOverrides::default();
        for item in overrides {
            let result = match item {
                Override::Property { path, op, value } => {
                    self.apply_property(tree, scope, relative_to, path, *op, value, &mut applied)
                }
                Override::Subtree {
                    name,
                    kind,
                    replacement,
                } => self.apply_subtree(tree, relative_to, name, kind.as_deref(), replacement, &mut applied),
            };
            if let Err(err) = result {
                tracing::warn!(
                    item = %item.describe(),
                    error = %err,
                    reverted = applied.len(),
                    "override failed; reverting"
                );
                if let Err(undo_err) = self.undo(tree, applied) {
                    tracing::error!(error = %undo_err, "revert after failed override was incomplete");
                }
                return Err(err);
            }
            tracing::debug!(item = %item.describe(), "override applied");
        }
        Ok(applied)
    }

    /// Restore everything an [`ReplacementEngine::apply`] call changed
    ///
    /// Entries are reverted newest first so later overrides that depended on
    /// earlier ones unwind correctly.
    ///
    /// # Errors
    /// Fails if the tree was edited since `apply` in a way that removed a
    /// recorded location; remaining entries are still attempted
    pub fn undo(&self, tree: &mut Tree, applied: AppliedOverrides) -> Result<(), OverrideError> {
        let mut first_error = None;
        for entry in applied.entries.into_iter().rev() {
            if let Err(err) = self.undo_entry(tree, entry) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn undo_entry(&self, tree: &mut Tree, entry: UndoEntry) -> Result<(), OverrideError> {
        match entry {
            UndoEntry::Property {
                at,
                path,
                property,
                previous,
            } => {
                let node = tree.node_at_position(&at).ok_or_else(|| vanished(&path))?;
                let location = Location {
                    path: path.clone(),
                    node,
                    property: Some(property),
                };
                self.locator
                    .write(tree, &location, previous)
                    .map(drop)
                    .map_err(|source| OverrideError::Rejected { path, source })
            }
            UndoEntry::Subtree { at, original } => {
                let name = original[original.root()].name().to_string();
                let node = tree.node_at_position(&at).ok_or_else(|| vanished(&name))?;
                tree.replace(node, original)?;
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_property(
        &self,
        tree: &mut Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
        op: OverrideOp,
        value: &Value,
        applied: &mut AppliedOverrides,
    ) -> Result<(), OverrideError> {
        let locations = self
            .locator
            .locate_all(tree, scope, relative_to, path)
            .map_err(|e| OverrideError::UnresolvedOverridePath {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        for location in locations {
            let Some(property) = location.property.clone() else {
                return Err(OverrideError::UnresolvedOverridePath {
                    path: path.to_string(),
                    reason: "path names a node, not a property".to_string(),
                });
            };
            let reject = |source| OverrideError::Rejected {
                path: path.to_string(),
                source,
            };
            let current = self.locator.read(tree, &location).map_err(reject)?;
            let updated = combine(op, current, value).ok_or_else(|| OverrideError::NotAList {
                path: path.to_string(),
                op,
            })?;
            let previous = self.locator.write(tree, &location, updated).map_err(reject)?;
            let at = tree
                .position_path(location.node)
                .ok_or_else(|| vanished(path))?;
            applied.entries.push(UndoEntry::Property {
                at,
                path: path.to_string(),
                property,
                previous,
            });
        }
        Ok(())
    }

    fn apply_subtree(
        &self,
        tree: &mut Tree,
        relative_to: NodeId,
        name: &str,
        kind: Option<&str>,
        replacement: &Tree,
        applied: &mut AppliedOverrides,
    ) -> Result<(), OverrideError> {
        let target = tree
            .descendants(relative_to)
            .find(|&id| {
                let node = &tree[id];
                node.name().eq_ignore_ascii_case(name)
                    && kind.map_or(true, |k| node.model().is_kind(k))
            })
            .ok_or_else(|| OverrideError::UnresolvedOverridePath {
                path: name.to_string(),
                reason: format!(
                    "no node named '{name}'{} under '{}'",
                    kind.map(|k| format!(" of kind {k}")).unwrap_or_default(),
                    tree.path_of(relative_to)
                ),
            })?;

        let at = tree.position_path(target).ok_or_else(|| vanished(name))?;
        let (_, original) = tree.replace(target, replacement.clone())?;
        applied.entries.push(UndoEntry::Subtree { at, original });
        Ok(())
    }
}

fn vanished(path: &str) -> OverrideError {
    OverrideError::UnresolvedOverridePath {
        path: path.to_string(),
        reason: "location no longer exists".to_string(),
    }
}

/// Key of a `key=value` list entry
fn entry_key(value: &Value) -> Option<&str> {
    value.as_str()?.split_once('=').map(|(k, _)| k.trim())
}

/// Apply `op` to `current`; `None` if a list operation hit a non-list
fn combine(op: OverrideOp, current: Value, operand: &Value) -> Option<Value> {
    match op {
        OverrideOp::Assign => Some(operand.clone()),
        OverrideOp::Append | OverrideOp::Remove => {
            let mut items = match current {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                _ => return None,
            };
            let operands = match operand {
                Value::Array(values) => values.clone(),
                other => vec![other.clone()],
            };
            for operand in operands {
                let key = entry_key(&operand).or_else(|| {
                    (op == OverrideOp::Remove)
                        .then(|| operand.as_str())
                        .flatten()
                });
                items.retain(|item| {
                    item != &operand
                        && !matches!((key, entry_key(item)), (Some(k), Some(ik)) if k.eq_ignore_ascii_case(ik))
                });
                if op == OverrideOp::Append {
                    items.push(operand);
                }
            }
            Some(Value::Array(items))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_utils::{folder, probe, Probe};
    use canopy_tree::AsAny;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_operators() {
        let parsed: Override = "[K].Value=5".parse().unwrap();
        assert!(matches!(
            parsed,
            Override::Property { ref path, op: OverrideOp::Assign, ref value } if path == "[K].Value" && value == &json!(5)
        ));

        let parsed: Override = "Rules += sow=true".parse().unwrap();
        assert!(matches!(
            parsed,
            Override::Property { ref path, op: OverrideOp::Append, ref value } if path == "Rules" && value == &json!("sow=true")
        ));

        let parsed: Override = "Tags-=[\"a\"]".parse().unwrap();
        assert!(matches!(parsed, Override::Property { op: OverrideOp::Remove, .. }));

        assert!("no equals sign".parse::<Override>().is_err());
        assert!("=5".parse::<Override>().is_err());
    }

    #[test]
    fn append_replaces_keyed_entries() {
        let current = json!(["a=1", "b=2"]);
        let updated = combine(OverrideOp::Append, current, &json!("a=3")).unwrap();
        assert_eq!(updated, json!(["b=2", "a=3"]));
    }

    #[test]
    fn remove_by_value_or_key() {
        let current = json!(["a=1", "b=2", "c"]);
        let updated = combine(OverrideOp::Remove, current.clone(), &json!("a")).unwrap();
        assert_eq!(updated, json!(["b=2", "c"]));
        let updated = combine(OverrideOp::Remove, current, &json!("c")).unwrap();
        assert_eq!(updated, json!(["a=1", "b=2"]));
    }

    #[test]
    fn list_ops_need_lists() {
        assert!(combine(OverrideOp::Append, json!(1), &json!(2)).is_none());
        assert_eq!(combine(OverrideOp::Append, Value::Null, &json!(2)), Some(json!([2])));
    }

    #[test]
    fn subtree_swap_and_undo() {
        let mut tree = Tree::new("Root", folder());
        let root = tree.root();
        let k = tree.add_child(root, "K", probe(1.0)).unwrap();
        tree.add_child(root, "After", folder()).unwrap();

        let replacement = Tree::new("K", probe(42.0));
        let engine = ReplacementEngine::new();
        let scope = ScopeResolver::new();
        let applied = engine
            .apply(&mut tree, &scope, root, &[Override::subtree("k", Some("Probe"), replacement)])
            .unwrap();

        assert!(!tree.contains(k));
        let swapped = tree.children(root)[0];
        let model = tree[swapped].model().as_any().downcast_ref::<Probe>().unwrap();
        assert_eq!(model.value, 42.0);

        engine.undo(&mut tree, applied).unwrap();
        let restored = tree.children(root)[0];
        let model = tree[restored].model().as_any().downcast_ref::<Probe>().unwrap();
        assert_eq!(model.value, 1.0);
        assert_eq!(tree[tree.children(root)[1]].name(), "After");
    }

    #[test]
    fn subtree_kind_filter() {
        let mut tree = Tree::new("Root", folder());
        let root = tree.root();
        tree.add_child(root, "K", folder()).unwrap();

        let scope = ScopeResolver::new();
        let err = ReplacementEngine::new()
            .apply(
                &mut tree,
                &scope,
                root,
                &[Override::subtree("K", Some("Probe"), Tree::new("K", probe(0.0)))],
            )
            .unwrap_err();
        assert!(matches!(err, OverrideError::UnresolvedOverridePath { .. }));
    }
}
