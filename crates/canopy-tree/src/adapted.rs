//! Plain values adapted into the tree
//!
//! A payload that is not a native [`Model`] is stored as an [`AdaptedValue`]:
//! a JSON document tagged with a kind. The kind's [`Discovery`] function,
//! registered with the [`TypeRegistry`](crate::TypeRegistry), reports the
//! logical name of the value and its logical children.

use crate::error::PropertyError;
use crate::model::{Model, Properties};
use serde_json::Value;

/// Logical shape of an adapted value
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered {
    /// Name of the node that will hold the value
    pub name: String,
    /// Values that become child nodes, in order
    pub children: Vec<AdaptedValue>,
}

/// Reports the logical name and children of an adapted value
pub type Discovery = fn(&AdaptedValue) -> Discovered;

/// A plain JSON payload tagged with a kind
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedValue {
    kind: String,
    data: Value,
}

impl AdaptedValue {
    /// Wrap a JSON value
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// The wrapped document
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Unwrap the document
    #[must_use]
    pub fn into_data(self) -> Value {
        self.data
    }

    fn is_field(value: &Value) -> bool {
        !value.is_object()
    }
}

impl Model for AdaptedValue {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn properties_mut(&mut self) -> Option<&mut dyn Properties> {
        Some(self)
    }
}

/// Top-level non-object fields are properties; object fields are children
impl Properties for AdaptedValue {
    fn property_names(&self) -> Vec<String> {
        match &self.data {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| Self::is_field(v))
                .map(|(k, _)| k.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        let key = self.canonical_name(name)?;
        self.data.get(&key).cloned()
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        let key = self
            .canonical_name(name)
            .ok_or_else(|| PropertyError::Unknown {
                name: name.to_string(),
            })?;
        match &mut self.data {
            Value::Object(map) => {
                map.insert(key, value);
                Ok(())
            }
            _ => Err(PropertyError::NotSettable {
                kind: self.kind.clone(),
            }),
        }
    }
}

/// Discovery for nested JSON objects
///
/// The node name is the `Name` field (or the kind); every object-valued
/// field becomes a child of the same kind named after its key.
#[must_use]
pub fn discover_nested(value: &AdaptedValue) -> Discovered {
    let name = value
        .data
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or(&value.kind)
        .to_string();

    let children = match &value.data {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| v.is_object())
            .map(|(key, v)| {
                let mut data = v.clone();
                if let Value::Object(fields) = &mut data {
                    fields
                        .entry("Name")
                        .or_insert_with(|| Value::String(key.clone()));
                }
                AdaptedValue::new(value.kind.clone(), data)
            })
            .collect(),
        _ => Vec::new(),
    };

    Discovered { name, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_skip_nested_objects() {
        let value = AdaptedValue::new("Params", json!({"Name": "P", "Rate": 2, "Inner": {"X": 1}}));
        assert_eq!(value.property_names(), vec!["Name", "Rate"]);
        assert_eq!(value.get_property("rate"), Some(json!(2)));
    }

    #[test]
    fn set_known_property_only() {
        let mut value = AdaptedValue::new("Params", json!({"Rate": 2}));
        value.set_property("RATE", json!(3)).unwrap();
        assert_eq!(value.data()["Rate"], json!(3));
        assert_eq!(
            value.set_property("Missing", json!(1)),
            Err(PropertyError::Unknown {
                name: "Missing".into()
            })
        );
    }

    #[test]
    fn nested_discovery_names_children_by_key() {
        let value = AdaptedValue::new("Params", json!({"Name": "Top", "Inner": {"X": 1}}));
        let found = discover_nested(&value);
        assert_eq!(found.name, "Top");
        assert_eq!(found.children.len(), 1);
        assert_eq!(found.children[0].data()["Name"], json!("Inner"));
    }
}
