//! Row records.

use crate::models::{EntityMetadata, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One row: attribute name to value.
///
/// Records are plain data. Statement builders only read the keys named in an
/// entity's attribute list; other keys are carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of an attribute, NULL when absent.
    pub fn value_or_null(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop every key that is not an attribute of `entity`.
    pub fn retain_attributes(&mut self, entity: &EntityMetadata) {
        self.values.retain(|k, _| entity.has_attribute(k));
    }

    /// Convert to a JSON object.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticType;

    #[test]
    fn test_accessors() {
        let mut record = Record::new().with("id", 7).with("name", "Ada");
        assert_eq!(record.get_i64("id"), Some(7));
        assert_eq!(record.get_str("name"), Some("Ada"));
        assert_eq!(record.value_or_null("missing"), Value::Null);

        let previous = record.set("name", "Grace");
        assert_eq!(previous, Some(Value::String("Ada".into())));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_retain_attributes() {
        let entity = EntityMetadata::table("users").column("id", SemanticType::Integer);
        let mut record = Record::new().with("id", 1).with("computed", "x");
        record.retain_attributes(&entity);
        assert!(record.contains("id"));
        assert!(!record.contains("computed"));
    }

    #[test]
    fn test_to_json_map() {
        let record: Record = [("a", Value::Int(1)), ("b", Value::Null)]
            .into_iter()
            .collect();
        let map = record.to_json_map();
        assert_eq!(map["a"], 1);
        assert!(map["b"].is_null());
    }
}
