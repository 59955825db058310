use crate::error::{Error, Result};
use crate::table::registry::TableSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static TABLE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid table name pattern"));

static OUTPUT_COLUMN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid column name pattern"));

/// Schema of one logical output table.
///
/// `raw_columns` are the flattened key-paths read from a row and
/// `output_columns` the names published in the manifest, aligned by position.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub raw_columns: Vec<String>,
    pub output_columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub json_columns: Vec<String>,
    pub incremental: bool,
}

impl TableDefinition {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, raw_columns: &[S], output_columns: &[S]) -> Self {
        TableDefinition {
            name: name.into(),
            raw_columns: to_strings(raw_columns),
            output_columns: to_strings(output_columns),
            primary_key: vec![],
            json_columns: vec![],
            incremental: false,
        }
    }

    /// Resolve a registry entry with the run's load mode
    pub fn from_schema(schema: &TableSchema, incremental: bool) -> Self {
        TableDefinition {
            name: schema.name.to_string(),
            raw_columns: to_strings(schema.raw_columns),
            output_columns: to_strings(schema.output_columns),
            primary_key: to_strings(schema.primary_key),
            json_columns: to_strings(schema.json_columns),
            incremental,
        }
    }

    pub fn with_primary_key<S: AsRef<str>>(mut self, primary_key: &[S]) -> Self {
        self.primary_key = to_strings(primary_key);
        self
    }

    pub fn with_json_columns<S: AsRef<str>>(mut self, json_columns: &[S]) -> Self {
        self.json_columns = to_strings(json_columns);
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            incremental: self.incremental,
            primary_key: self.primary_key.clone(),
            columns: self.output_columns.clone(),
        }
    }

    /// Check the definition is internally consistent
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidDefinition {
            table: self.name.clone(),
            reason,
        };

        if !TABLE_NAME_REGEX.is_match(&self.name) {
            return Err(invalid("name must be lowercase words joined by '-'".to_string()));
        }
        if self.raw_columns.is_empty() {
            return Err(invalid("no columns".to_string()));
        }
        if self.raw_columns.len() != self.output_columns.len() {
            return Err(invalid(format!(
                "{} raw columns but {} output columns",
                self.raw_columns.len(),
                self.output_columns.len()
            )));
        }
        if let Some(dup) = first_duplicate(&self.raw_columns) {
            return Err(invalid(format!("duplicate raw column `{}`", dup)));
        }
        if let Some(dup) = first_duplicate(&self.output_columns) {
            return Err(invalid(format!("duplicate output column `{}`", dup)));
        }
        if let Some(bad) = self.output_columns.iter().find(|c| !OUTPUT_COLUMN_REGEX.is_match(c)) {
            return Err(invalid(format!("output column `{}` is not a valid identifier", bad)));
        }
        if let Some(pk) = self.primary_key.iter().find(|c| !self.output_columns.contains(c)) {
            return Err(invalid(format!("primary key `{}` is not an output column", pk)));
        }
        if let Some(col) = self.json_columns.iter().find(|c| !self.raw_columns.contains(c)) {
            return Err(invalid(format!("JSON column `{}` is not a raw column", col)));
        }

        Ok(())
    }
}

/// Sidecar document describing a table file to the loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub incremental: bool,
    pub primary_key: Vec<String>,
    pub columns: Vec<String>,
}

fn to_strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

fn first_duplicate(items: &[String]) -> Option<&String> {
    let mut seen = HashSet::new();
    items.iter().find(|item| !seen.insert(item.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_shape() {
        let definition = TableDefinition::new("jobs", &["id", "region"], &["id", "region"])
            .with_primary_key(&["id"])
            .with_incremental(true);

        let manifest = serde_json::to_string(&definition.manifest()).unwrap();
        assert_eq!(manifest, r#"{"incremental":true,"primary_key":["id"],"columns":["id","region"]}"#);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&manifest).unwrap(),
            json!({"incremental": true, "primary_key": ["id"], "columns": ["id", "region"]})
        );
    }

    #[test]
    fn test_validate_catches_misalignment() {
        let definition = TableDefinition::new("jobs", &["id", "runId"], &["id"]);
        let err = definition.validate().unwrap_err();
        assert!(err.to_string().contains("2 raw columns but 1 output columns"));
    }

    #[test]
    fn test_validate_catches_foreign_keys() {
        let definition = TableDefinition::new("jobs", &["id", "runId"], &["id", "run_id"])
            .with_primary_key(&["runId"]);
        assert!(definition.validate().is_err());

        let definition = TableDefinition::new("jobs", &["id", "runId"], &["id", "run_id"])
            .with_json_columns(&["run_id"]);
        assert!(definition.validate().is_err());

        let definition = TableDefinition::new("jobs", &["id", "runId"], &["id", "run_id"])
            .with_primary_key(&["id", "run_id"])
            .with_json_columns(&["runId"]);
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(TableDefinition::new("Jobs", &["id"], &["id"]).validate().is_err());
        assert!(TableDefinition::new("jobs", &["id"], &["Run Id"]).validate().is_err());
        assert!(TableDefinition::new("jobs", &["id", "id"], &["a", "b"]).validate().is_err());
    }
}
