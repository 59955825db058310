use crate::error::{json_type_name, Error, Result};
use crate::flatten::{to_cell_text, to_json_text, FlattenConfig, JsonFlattener, ParentContext};
use crate::table::definition::TableDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One projected row: a text cell for every column of its table
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    definition: Arc<TableDefinition>,
    cells: Vec<String>,
}

impl OutputRow {
    /// Cell for an output column name
    pub fn get(&self, column: &str) -> Option<&str> {
        let position = self.definition.output_columns.iter().position(|c| c == column)?;
        self.cells.get(position).map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.definition.output_columns
    }

    pub fn values(&self) -> &[String] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.definition
            .output_columns
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(String::as_str))
    }

    pub fn into_values(self) -> Vec<String> {
        self.cells
    }
}

/// Projects raw API objects onto the fixed columns of one table
pub struct RowProjector {
    definition: Arc<TableDefinition>,
    flattener: JsonFlattener,
    positions: HashMap<String, usize>,
}

impl RowProjector {
    pub fn new(definition: Arc<TableDefinition>, config: FlattenConfig) -> Self {
        let positions = definition
            .raw_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.clone(), idx))
            .collect();

        RowProjector {
            definition,
            flattener: JsonFlattener::new(config),
            positions,
        }
    }

    pub fn definition(&self) -> &Arc<TableDefinition> {
        &self.definition
    }

    /// Project a raw row.
    ///
    /// JSON columns are lifted out before flattening and stored as JSON text
    /// under their own name; the rest is flattened. Key-paths outside the
    /// table's columns are dropped and missing columns stay empty. The parent
    /// context is applied last and wins every collision.
    pub fn project(&self, raw_row: Value, parent: &ParentContext) -> Result<OutputRow> {
        let table = &self.definition.name;
        let mut obj = match raw_row {
            Value::Object(obj) => obj,
            other => {
                return Err(Error::MalformedRow {
                    table: table.clone(),
                    found: json_type_name(&other),
                })
            }
        };

        let mut set_aside = Vec::with_capacity(self.definition.json_columns.len());
        for column in &self.definition.json_columns {
            if let Some(value) = obj.remove(column) {
                let text = to_json_text(&value).map_err(|source| Error::JsonColumn {
                    table: table.clone(),
                    column: column.clone(),
                    source,
                })?;
                set_aside.push((column.clone(), Value::String(text)));
            }
        }

        let mut flat = self.flattener.flatten(Value::Object(obj));
        flat.extend(set_aside);

        let mut cells = vec![String::new(); self.definition.raw_columns.len()];
        for (key, value) in flat.iter() {
            if let Some(&position) = self.positions.get(key) {
                cells[position] = to_cell_text(value)?;
            }
        }

        for (key, value) in parent.iter() {
            match self.positions.get(key) {
                Some(&position) => cells[position] = to_cell_text(value)?,
                None => tracing::trace!(table = %table, key = %key, "parent key has no column"),
            }
        }

        Ok(OutputRow {
            definition: Arc::clone(&self.definition),
            cells,
        })
    }
}
