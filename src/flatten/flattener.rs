use crate::flatten::types::{FlatRow, FlattenConfig};
use serde_json::Value;
use std::collections::HashSet;

/// Reduces nested JSON objects to a flat key-path to leaf mapping
pub struct JsonFlattener {
    config: FlattenConfig,
    preserve_keys: HashSet<String>,
}

impl JsonFlattener {
    pub fn new(config: FlattenConfig) -> Self {
        let preserve_keys = config.preserve_keys.iter().cloned().collect();
        JsonFlattener {
            config,
            preserve_keys,
        }
    }

    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Flatten a JSON value into a fresh mapping.
    ///
    /// Objects are walked in key order and their keys joined with the
    /// configured separator. Anything that is not an object (and, unless
    /// `flatten_lists` is set, any list) is a leaf. A non-object root ends up
    /// under the empty key-path.
    pub fn flatten(&self, value: Value) -> FlatRow {
        let mut out = FlatRow::new();
        self.flatten_into(value, String::new(), &mut out);
        out
    }

    fn flatten_into(&self, value: Value, path: String, out: &mut FlatRow) {
        match value {
            Value::Object(obj) => {
                for (key, child) in obj.into_iter() {
                    if self.preserve_keys.contains(&key) {
                        out.insert(key, child);
                    } else {
                        let child_path = self.join(&path, &key);
                        self.flatten_into(child, child_path, out);
                    }
                }
            }
            Value::Array(items) if self.config.flatten_lists => {
                for (idx, item) in items.into_iter().enumerate() {
                    let child_path = self.join(&path, &idx.to_string());
                    self.flatten_into(item, child_path, out);
                }
            }
            leaf => {
                // Separator collisions overwrite: the later path wins
                out.insert(path, leaf);
            }
        }
    }

    fn join(&self, parent: &str, segment: &str) -> String {
        if parent.is_empty() {
            segment.to_string()
        } else {
            let mut path =
                String::with_capacity(parent.len() + self.config.separator.len() + segment.len());
            path.push_str(parent);
            path.push_str(&self.config.separator);
            path.push_str(segment);
            path
        }
    }
}

impl Default for JsonFlattener {
    fn default() -> Self {
        JsonFlattener::new(FlattenConfig::default())
    }
}
