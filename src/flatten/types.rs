use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flattened object: key-path to leaf value, in source key order
pub type FlatRow = Map<String, Value>;

/// Configuration for the flattening process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Separator placed between the segments of a key-path
    pub separator: String,

    /// Expand lists by index instead of keeping them as opaque leaves
    pub flatten_lists: bool,

    /// Object keys whose value is kept whole, stored under the bare key name
    pub preserve_keys: Vec<String>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            separator: String::from("_"),
            flatten_lists: false,
            preserve_keys: vec![],
        }
    }
}

/// Caller-supplied values linking a child row to its logical parent.
///
/// Every key here overrides the same-named key produced by flattening.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentContext(Map<String, Value>);

impl ParentContext {
    pub fn new() -> Self {
        ParentContext(Map::new())
    }

    /// Returns the context extended with `key`, replacing any previous value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ParentContext {
    fn from(map: Map<String, Value>) -> Self {
        ParentContext(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParentContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParentContext(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
