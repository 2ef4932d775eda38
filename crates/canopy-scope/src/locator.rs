//! Path-based location of nodes and property values
//!
//! Path syntax:
//!
//! ```text
//! .Root.Clock.Start        absolute; the first segment must name the root
//! [Sowing].Script.Date     starts at a node in scope, found by name or kind
//! Leaf.Area                relative to the starting node's children
//! Layers[2]                1-based element of an array property
//! Layers[2:3]              1-based inclusive slice (read only)
//! Config.rate              field of an object-valued property
//! ```
//!
//! While walking a path, a segment names a property of the current node if
//! one exists, otherwise a child node. Once inside a property value the
//! remaining segments navigate the JSON value.

use crate::error::LocateError;
use crate::resolver::ScopeResolver;
use canopy_tree::{NodeId, Properties, Tree};
use serde_json::Value;

/// One navigation step inside a property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Object field, or that field of every element of an array
    Field(String),
    /// Zero-based array element
    Index(usize),
    /// Zero-based inclusive array slice
    Range(usize, usize),
}

/// A property of a node and the steps into its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    /// Canonical property name
    pub name: String,
    /// Steps into the property value
    pub steps: Vec<Step>,
}

/// Where a path resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// The path as given
    pub path: String,
    /// Node reached by the path
    pub node: NodeId,
    /// Property of that node, if the path continued into one
    pub property: Option<PropertyPath>,
}

enum Start<'p> {
    Relative,
    Scoped(&'p str),
    Absolute(&'p str),
}

/// Resolves locator paths against a tree
#[derive(Debug, Clone, Copy, Default)]
pub struct Locator {
    case_sensitive: bool,
}

impl Locator {
    /// Case-insensitive locator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare names exactly instead of ignoring ASCII case
    #[inline]
    #[must_use]
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    fn names_match(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Resolve `path` to a single location
    ///
    /// A bracketed name picks the first match in scope.
    ///
    /// # Errors
    /// Any [`LocateError`] describing where resolution stopped
    pub fn locate(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
    ) -> Result<Location, LocateError> {
        let (start, rest) = split_start(path)?;
        let node = match start {
            Start::Relative => relative_to,
            Start::Absolute(root_name) => self.checked_root(tree, root_name, path)?,
            Start::Scoped(name) => self
                .scoped_matches(tree, scope, relative_to, name)
                .into_iter()
                .next()
                .ok_or_else(|| not_in_scope(tree, relative_to, name))?,
        };
        self.walk(tree, node, rest, path)
    }

    /// Resolve `path` to every location it matches
    ///
    /// Identical to [`Locator::locate`] except that a bracketed name expands
    /// to every same-named node in scope. Paths that resolve from some of
    /// those nodes but not others yield only the successful locations.
    ///
    /// # Errors
    /// Fails when nothing matches
    pub fn locate_all(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
    ) -> Result<Vec<Location>, LocateError> {
        let (start, rest) = split_start(path)?;
        let Start::Scoped(name) = start else {
            return self.locate(tree, scope, relative_to, path).map(|l| vec![l]);
        };

        let starts = self.scoped_matches(tree, scope, relative_to, name);
        if starts.is_empty() {
            return Err(not_in_scope(tree, relative_to, name));
        }

        let mut found = Vec::new();
        let mut first_error = None;
        for node in starts {
            match self.walk(tree, node, rest, path) {
                Ok(location) => found.push(location),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match (found.is_empty(), first_error) {
            (true, Some(err)) => Err(err),
            _ => Ok(found),
        }
    }

    /// Resolve a path that must end at a node
    ///
    /// # Errors
    /// [`LocateError::UnknownSegment`] when the path ends inside a property
    pub fn find_node(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
    ) -> Result<NodeId, LocateError> {
        let location = self.locate(tree, scope, relative_to, path)?;
        match location.property {
            None => Ok(location.node),
            Some(property) => Err(LocateError::UnknownSegment {
                path: path.to_string(),
                segment: property.name,
            }),
        }
    }

    /// Read the value at `path`
    ///
    /// # Errors
    /// [`LocateError::NotAValue`] when the path ends at a node
    pub fn get(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
    ) -> Result<Value, LocateError> {
        let location = self.locate(tree, scope, relative_to, path)?;
        self.read(tree, &location)
    }

    /// Write `value` at `path`, returning the value it replaced
    ///
    /// # Errors
    /// Resolution errors, or [`LocateError::Property`] when the model rejects
    /// the value
    pub fn set(
        &self,
        tree: &mut Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        path: &str,
        value: Value,
    ) -> Result<Value, LocateError> {
        let location = self.locate(tree, scope, relative_to, path)?;
        self.write(tree, &location, value)
    }

    /// Read the value at a resolved location
    ///
    /// # Errors
    /// [`LocateError::NotAValue`] for node locations, navigation errors for
    /// missing fields or indices
    pub fn read(&self, tree: &Tree, location: &Location) -> Result<Value, LocateError> {
        let (props, property) = self.property_of(tree, location)?;
        let mut value = props
            .get_property(&property.name)
            .ok_or_else(|| unknown(&location.path, &property.name))?;
        for step in &property.steps {
            value = self.apply_step(value, step, &location.path)?;
        }
        Ok(value)
    }

    /// Write at a resolved location, returning the value it replaced
    ///
    /// # Errors
    /// [`LocateError::NotSettable`] for slices and node locations
    pub fn write(
        &self,
        tree: &mut Tree,
        location: &Location,
        value: Value,
    ) -> Result<Value, LocateError> {
        let (props, property) = self.property_of(tree, location)?;
        let current = props
            .get_property(&property.name)
            .ok_or_else(|| unknown(&location.path, &property.name))?;

        let mut updated = current.clone();
        let slot = self.slot_mut(&mut updated, &property.steps, &location.path)?;
        let previous = std::mem::replace(slot, value);

        let name = property.name.clone();
        let props = tree
            .model_mut(location.node)
            .and_then(|m| m.properties_mut())
            .ok_or_else(|| LocateError::NotSettable {
                path: location.path.clone(),
            })?;
        props
            .set_property(&name, updated)
            .map_err(|source| LocateError::Property {
                path: location.path.clone(),
                source,
            })?;
        Ok(previous)
    }

    fn property_of<'t, 'l>(
        &self,
        tree: &'t Tree,
        location: &'l Location,
    ) -> Result<(&'t dyn Properties, &'l PropertyPath), LocateError> {
        let property = location
            .property
            .as_ref()
            .ok_or_else(|| LocateError::NotAValue {
                path: location.path.clone(),
            })?;
        let props = tree
            .model(location.node)
            .and_then(|m| m.properties())
            .ok_or_else(|| unknown(&location.path, &property.name))?;
        Ok((props, property))
    }

    fn checked_root(&self, tree: &Tree, root_name: &str, path: &str) -> Result<NodeId, LocateError> {
        let root = tree.root();
        if self.names_match(tree[root].name(), root_name) {
            Ok(root)
        } else {
            Err(LocateError::WrongRoot {
                path: path.to_string(),
            })
        }
    }

    /// Nodes in scope named `name`, or failing that, of kind `name`
    fn scoped_matches(
        &self,
        tree: &Tree,
        scope: &ScopeResolver,
        relative_to: NodeId,
        name: &str,
    ) -> Vec<NodeId> {
        let visible = scope.visible_nodes_of(tree, relative_to);
        let by_name: Vec<NodeId> = visible
            .iter()
            .copied()
            .filter(|&id| self.names_match(tree[id].name(), name))
            .collect();
        if !by_name.is_empty() {
            return by_name;
        }
        visible
            .iter()
            .copied()
            .filter(|&id| tree[id].model().is_kind(name))
            .collect()
    }

    fn walk(&self, tree: &Tree, start: NodeId, rest: &str, path: &str) -> Result<Location, LocateError> {
        let mut node = start;
        let mut property: Option<PropertyPath> = None;

        for raw in rest.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            let (segment, spec) = split_spec(raw, path)?;
            let index_step = spec.map(|s| parse_spec(s, path)).transpose()?;

            if let Some(prop) = property.as_mut() {
                prop.steps.push(Step::Field(segment.to_string()));
                prop.steps.extend(index_step);
                continue;
            }

            if let Some(name) = self.property_name(tree, node, segment) {
                property = Some(PropertyPath {
                    name,
                    steps: index_step.into_iter().collect(),
                });
                continue;
            }

            let child = tree
                .children(node)
                .iter()
                .copied()
                .find(|&c| self.names_match(tree[c].name(), segment))
                .ok_or_else(|| unknown(path, segment))?;
            if let Some(spec) = spec {
                return Err(LocateError::BadIndex {
                    path: path.to_string(),
                    index: spec.to_string(),
                });
            }
            node = child;
        }

        Ok(Location {
            path: path.to_string(),
            node,
            property,
        })
    }

    fn property_name(&self, tree: &Tree, node: NodeId, segment: &str) -> Option<String> {
        let props = tree.model(node)?.properties()?;
        if self.case_sensitive {
            props.property_names().into_iter().find(|n| n == segment)
        } else {
            props.canonical_name(segment)
        }
    }

    fn field_key<'v>(&self, map: &'v serde_json::Map<String, Value>, field: &str) -> Option<&'v String> {
        map.keys().find(|k| self.names_match(k, field))
    }

    fn apply_step(&self, value: Value, step: &Step, path: &str) -> Result<Value, LocateError> {
        match (step, value) {
            (Step::Field(field), Value::Object(mut map)) => {
                let key = self.field_key(&map, field).cloned();
                key.and_then(|k| map.remove(&k))
                    .ok_or_else(|| unknown(path, field))
            }
            (Step::Field(field), Value::Array(items)) => items
                .into_iter()
                .map(|item| self.apply_step(item, step, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
                .map_err(|_| unknown(path, field)),
            (Step::Index(i), Value::Array(mut items)) if *i < items.len() => {
                Ok(items.swap_remove(*i))
            }
            (Step::Range(a, b), Value::Array(items)) if a <= b && *b < items.len() => {
                Ok(Value::Array(items[*a..=*b].to_vec()))
            }
            (Step::Field(field), _) => Err(unknown(path, field)),
            (Step::Index(_) | Step::Range(..), _) => Err(LocateError::BadIndex {
                path: path.to_string(),
                index: describe_step(step),
            }),
        }
    }

    fn slot_mut<'v>(
        &self,
        value: &'v mut Value,
        steps: &[Step],
        path: &str,
    ) -> Result<&'v mut Value, LocateError> {
        let Some((step, rest)) = steps.split_first() else {
            return Ok(value);
        };
        let next = match step {
            Step::Field(field) => {
                let Value::Object(map) = value else {
                    return Err(unknown(path, field));
                };
                let key = self
                    .field_key(map, field)
                    .cloned()
                    .ok_or_else(|| unknown(path, field))?;
                map.get_mut(&key).ok_or_else(|| unknown(path, field))?
            }
            Step::Index(i) => {
                let bad = || LocateError::BadIndex {
                    path: path.to_string(),
                    index: describe_step(step),
                };
                let Value::Array(items) = value else {
                    return Err(bad());
                };
                items.get_mut(*i).ok_or_else(bad)?
            }
            Step::Range(..) => {
                return Err(LocateError::NotSettable {
                    path: path.to_string(),
                })
            }
        };
        self.slot_mut(next, rest, path)
    }
}

fn unknown(path: &str, segment: &str) -> LocateError {
    LocateError::UnknownSegment {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

fn not_in_scope(tree: &Tree, relative_to: NodeId, name: &str) -> LocateError {
    LocateError::NotInScope {
        name: name.to_string(),
        relative_to: tree.path_of(relative_to).to_string(),
    }
}

fn describe_step(step: &Step) -> String {
    match step {
        Step::Index(i) => (i + 1).to_string(),
        Step::Range(a, b) => format!("{}:{}", a + 1, b + 1),
        Step::Field(f) => f.clone(),
    }
}

fn split_start(path: &str) -> Result<(Start<'_>, &str), LocateError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(LocateError::EmptyPath);
    }
    if let Some(inner) = path.strip_prefix('[') {
        let close = inner.find(']').ok_or_else(|| LocateError::UnclosedBracket {
            path: path.to_string(),
        })?;
        let rest = &inner[close + 1..];
        return Ok((Start::Scoped(inner[..close].trim()), rest));
    }
    if let Some(absolute) = path.strip_prefix('.') {
        let (root, rest) = absolute.split_once('.').unwrap_or((absolute, ""));
        return Ok((Start::Absolute(root), rest));
    }
    Ok((Start::Relative, path))
}

/// Split `Layers[2]` into `("Layers", Some("2"))`
fn split_spec<'s>(segment: &'s str, path: &str) -> Result<(&'s str, Option<&'s str>), LocateError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    let inner = segment[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| LocateError::UnclosedBracket {
            path: path.to_string(),
        })?;
    Ok((segment[..open].trim(), Some(inner.trim())))
}

/// Parse a 1-based index or inclusive range
fn parse_spec(spec: &str, path: &str) -> Result<Step, LocateError> {
    let bad = || LocateError::BadIndex {
        path: path.to_string(),
        index: spec.to_string(),
    };
    let one_based = |s: &str| {
        s.trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(bad)
    };
    match spec.split_once(':') {
        Some((a, b)) => Ok(Step::Range(one_based(a)?, one_based(b)?)),
        None => Ok(Step::Index(one_based(spec)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_utils::{boundary, folder, Probe};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Root {
    ///   Sim(boundary) { Zone { K(value=1, layers=[1,2,3], config={rate:0.5}) } },
    ///   Other { K(value=9) },
    ///   Sim2(boundary) { K(value=5) },
    /// }
    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new("Root", folder());
        let root = tree.root();
        let sim = tree.add_child(root, "Sim", boundary()).unwrap();
        let zone = tree.add_child(sim, "Zone", folder()).unwrap();
        let k = tree
            .add_child(
                zone,
                "K",
                Box::new(
                    Probe::new(1.0)
                        .with_layers(vec![1.0, 2.0, 3.0])
                        .with_config(json!({"rate": 0.5})),
                ),
            )
            .unwrap();
        let other = tree.add_child(root, "Other", folder()).unwrap();
        let k2 = tree.add_child(other, "K", Box::new(Probe::new(9.0))).unwrap();
        let sim2 = tree.add_child(root, "Sim2", boundary()).unwrap();
        tree.add_child(sim2, "K", Box::new(Probe::new(5.0))).unwrap();
        (tree, zone, k, k2)
    }

    #[test]
    fn absolute_relative_and_scoped() {
        let (tree, zone, k, _) = sample();
        let scope = ScopeResolver::new();
        let locator = Locator::new();

        assert_eq!(locator.get(&tree, &scope, zone, ".Root.Sim.Zone.K.Value").unwrap(), json!(1.0));
        assert_eq!(locator.get(&tree, &scope, zone, "K.Value").unwrap(), json!(1.0));
        assert_eq!(locator.get(&tree, &scope, zone, "[K].Value").unwrap(), json!(1.0));
        assert_eq!(locator.find_node(&tree, &scope, zone, "[k]").unwrap(), k);
    }

    #[test]
    fn scoped_falls_back_to_kind() {
        let (tree, zone, k, _) = sample();
        let scope = ScopeResolver::new();
        assert_eq!(Locator::new().find_node(&tree, &scope, zone, "[Probe]").unwrap(), k);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let (tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let err = Locator::new().get(&tree, &scope, zone, ".Nope.Sim").unwrap_err();
        assert!(matches!(err, LocateError::WrongRoot { .. }));
    }

    #[test]
    fn array_and_field_access() {
        let (tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let locator = Locator::new();

        assert_eq!(locator.get(&tree, &scope, zone, "K.Layers[2]").unwrap(), json!(2.0));
        assert_eq!(locator.get(&tree, &scope, zone, "K.Layers[2:3]").unwrap(), json!([2.0, 3.0]));
        assert_eq!(locator.get(&tree, &scope, zone, "K.Config.RATE").unwrap(), json!(0.5));
        assert!(matches!(
            locator.get(&tree, &scope, zone, "K.Layers[0]"),
            Err(LocateError::BadIndex { .. })
        ));
        assert!(matches!(
            locator.get(&tree, &scope, zone, "K.Layers[9]"),
            Err(LocateError::BadIndex { .. })
        ));
    }

    #[test]
    fn set_returns_previous_value() {
        let (mut tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let locator = Locator::new();

        let old = locator.set(&mut tree, &scope, zone, "K.Layers[1]", json!(7.0)).unwrap();
        assert_eq!(old, json!(1.0));
        assert_eq!(locator.get(&tree, &scope, zone, "K.Layers").unwrap(), json!([7.0, 2.0, 3.0]));

        let old = locator.set(&mut tree, &scope, zone, "K.Config.rate", json!(2)).unwrap();
        assert_eq!(old, json!(0.5));
    }

    #[test]
    fn slices_are_read_only() {
        let (mut tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let err = Locator::new()
            .set(&mut tree, &scope, zone, "K.Layers[1:2]", json!([0]))
            .unwrap_err();
        assert!(matches!(err, LocateError::NotSettable { .. }));
    }

    #[test]
    fn node_paths_are_not_values() {
        let (tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let err = Locator::new().get(&tree, &scope, zone, "K").unwrap_err();
        assert!(matches!(err, LocateError::NotAValue { .. }));
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let (tree, zone, ..) = sample();
        let scope = ScopeResolver::new();
        let strict = Locator::new().with_case_sensitive(true);
        assert!(strict.get(&tree, &scope, zone, "k.Value").is_err());
        assert!(strict.get(&tree, &scope, zone, "K.value").is_err());
        assert!(strict.get(&tree, &scope, zone, "K.Value").is_ok());
    }

    #[test]
    fn locate_all_broadcasts_over_scope() {
        let (tree, zone, k, k2) = sample();
        let scope = ScopeResolver::new();
        let locator = Locator::new();

        // The K under a plain folder is visible, the one inside Sim2 is not.
        let nodes: Vec<NodeId> = locator
            .locate_all(&tree, &scope, zone, "[K].Value")
            .unwrap()
            .into_iter()
            .map(|l| l.node)
            .collect();
        assert_eq!(nodes, vec![k, k2]);
    }
}
