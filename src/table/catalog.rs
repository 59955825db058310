use crate::error::{Error, Result};
use crate::flatten::{FlattenConfig, ParentContext};
use crate::table::definition::TableDefinition;
use crate::table::registry;
use crate::table::writer::{RowErrorPolicy, TableWriter};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Run-wide settings applied to every table the catalog opens
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    pub incremental: bool,
    pub flatten: FlattenConfig,
    pub on_row_error: RowErrorPolicy,
}

/// Rows produced for one table during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub rows_written: u64,
    pub rows_skipped: u64,
}

/// Owns the table definitions and writers of one run.
///
/// Definitions are resolved from the registry and writers opened on first
/// use; both are memoized by canonical table name. Every writer is flushed
/// when the catalog is closed or dropped.
pub struct TableCatalog {
    output_dir: PathBuf,
    options: CatalogOptions,
    definitions: HashMap<String, Arc<TableDefinition>>,
    writers: BTreeMap<String, TableWriter<File>>,
}

impl TableCatalog {
    pub fn new<P: AsRef<Path>>(output_dir: P, options: CatalogOptions) -> Result<Self> {
        registry::validate_all()?;

        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|source| Error::Sink {
            table: String::from("*"),
            path: output_dir.clone(),
            source,
        })?;

        Ok(TableCatalog {
            output_dir,
            options,
            definitions: HashMap::new(),
            writers: BTreeMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve a table name to its definition for this run
    pub fn definition(&mut self, name: &str) -> Result<Arc<TableDefinition>> {
        let schema = registry::lookup(name)?;
        let incremental = self.options.incremental;
        let definition = self
            .definitions
            .entry(schema.name.to_string())
            .or_insert_with(|| Arc::new(TableDefinition::from_schema(schema, incremental)));
        Ok(Arc::clone(definition))
    }

    /// The writer for a table, opening it (and writing its manifest) on first use
    pub fn writer(&mut self, name: &str) -> Result<&mut TableWriter<File>> {
        let definition = self.definition(name)?;

        match self.writers.entry(definition.name.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let writer =
                    TableWriter::create(&self.output_dir, definition, self.options.flatten.clone())?
                        .with_policy(self.options.on_row_error);
                Ok(entry.insert(writer))
            }
        }
    }

    pub fn write_row(&mut self, table: &str, raw_row: Value, parent: &ParentContext) -> Result<()> {
        self.writer(table)?.write_row(raw_row, parent)
    }

    pub fn write_rows<I>(&mut self, table: &str, raw_rows: I, parent: &ParentContext) -> Result<()>
    where
        I: IntoIterator<Item = Value>,
    {
        self.writer(table)?.write_rows(raw_rows, parent)
    }

    /// Tables opened so far, by name
    pub fn open_tables(&self) -> impl Iterator<Item = &str> {
        self.writers.keys().map(String::as_str)
    }

    pub fn summary(&self) -> Vec<TableSummary> {
        self.writers
            .iter()
            .map(|(name, writer)| TableSummary {
                name: name.clone(),
                rows_written: writer.rows_written(),
                rows_skipped: writer.rows_skipped(),
            })
            .collect()
    }

    /// Flush every open writer, reporting the first failure
    pub fn flush(&mut self) -> Result<()> {
        let mut first_error = None;
        for writer in self.writers.values_mut() {
            if let Err(e) = writer.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run `f` against the catalog and flush every writer afterwards, whether
    /// `f` succeeded or not. An error from `f` takes precedence over a flush
    /// error.
    pub fn scoped<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let outcome = f(self);
        let flushed = self.flush();
        let value = outcome?;
        flushed?;
        Ok(value)
    }
}

impl Drop for TableCatalog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "failed to flush tables");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(dir: &Path) -> TableCatalog {
        TableCatalog::new(dir, CatalogOptions::default()).unwrap()
    }

    #[test]
    fn test_definitions_are_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());

        let first = catalog.definition("tables-metadata").unwrap();
        let second = catalog.definition("TABLES_METADATA").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());

        let err = catalog.write_rows("nope", vec![json!({})], &ParentContext::new()).unwrap_err();

        assert!(matches!(err, Error::UnknownTable(_)));
        assert_eq!(catalog.open_tables().count(), 0);
    }

    #[test]
    fn test_writer_opened_once_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = TableCatalog::new(
            dir.path(),
            CatalogOptions {
                incremental: true,
                ..CatalogOptions::default()
            },
        )
        .unwrap();
        let parent = ParentContext::new().with("region", "eu").with("project_id", "7");

        catalog
            .write_rows("tables-columns", vec![json!({"column": "a"})], &parent.clone().with("table_id", "t1"))
            .unwrap();
        catalog
            .write_rows("tables-columns", vec![json!({"column": "b"})], &parent.clone().with("table_id", "t2"))
            .unwrap();
        catalog.flush().unwrap();

        let data = std::fs::read_to_string(dir.path().join("tables-columns.csv")).unwrap();
        assert_eq!(data, "\"t1\",\"eu\",\"7\",\"a\"\n\"t2\",\"eu\",\"7\",\"b\"\n");

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("tables-columns.csv.manifest")).unwrap())
                .unwrap();
        assert_eq!(manifest["incremental"], json!(true));
        assert_eq!(manifest["columns"], json!(["table_id", "region", "project_id", "column"]));

        assert_eq!(
            catalog.summary(),
            vec![TableSummary {
                name: "tables-columns".to_string(),
                rows_written: 2,
                rows_skipped: 0,
            }]
        );
    }

    #[test]
    fn test_scoped_flushes_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());

        let result: Result<()> = catalog.scoped(|catalog| {
            catalog.write_row("triggers-tables", json!({"tableId": "in.c-a.b"}), &ParentContext::new())?;
            catalog.write_row("triggers-tables", json!(42), &ParentContext::new())
        });

        assert!(result.is_err());
        let data = std::fs::read_to_string(dir.path().join("triggers-tables.csv")).unwrap();
        assert_eq!(data, "\"\",\"\",\"\",\"in.c-a.b\"\n");
        assert!(dir.path().join("triggers-tables.csv.manifest").exists());
    }
}
