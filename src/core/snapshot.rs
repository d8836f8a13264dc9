use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use super::attribute::Attribute;
use super::value::AttributeValue;

/// All attribute values observed for one item at one point in time.
/// A missing key means the attribute is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeSnapshot {
    values: HashMap<String, AttributeValue>,
}

impl AttributeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<A: Attribute>(mut self, attribute: &A, value: impl Into<AttributeValue>) -> Self {
        self.insert(attribute.key(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys present in either snapshot, in sorted order
    pub fn key_union(&self, other: &AttributeSnapshot) -> BTreeSet<String> {
        self.values.keys().chain(other.values.keys()).cloned().collect()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// JSON snapshots may carry explicit nulls; those are treated as absent.
impl<'de> Deserialize<'de> for AttributeSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, Option<AttributeValue>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}
