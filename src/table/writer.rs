use crate::error::{Error, ErrorKind, Result};
use crate::flatten::{FlattenConfig, ParentContext};
use crate::table::definition::TableDefinition;
use crate::table::projector::{OutputRow, RowProjector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do with a row that cannot be projected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorPolicy {
    /// Stop the run on the first bad row
    #[default]
    Abort,
    /// Log the row, count it and carry on
    Skip,
}

/// Appends projected rows of one table to a quoted CSV sink
pub struct TableWriter<W: Write> {
    projector: RowProjector,
    sink: csv::Writer<W>,
    policy: RowErrorPolicy,
    rows_written: u64,
    rows_skipped: u64,
}

impl TableWriter<File> {
    /// Write the table's manifest into `dir`, then create its data file.
    ///
    /// A data file left by a previous run is truncated.
    pub fn create<P: AsRef<Path>>(
        dir: P,
        definition: Arc<TableDefinition>,
        config: FlattenConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        write_manifest(dir, &definition)?;

        let path = dir.join(definition.file_name());
        let file = File::create(&path).map_err(|source| Error::Sink {
            table: definition.name.clone(),
            path: path.clone(),
            source,
        })?;

        tracing::debug!(table = %definition.name, path = %path.display(), "opened table");
        Ok(TableWriter::from_writer(definition, config, file))
    }
}

impl<W: Write> TableWriter<W> {
    /// Wrap any sink; no manifest is written
    pub fn from_writer(definition: Arc<TableDefinition>, config: FlattenConfig, writer: W) -> Self {
        let sink = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(writer);

        TableWriter {
            projector: RowProjector::new(definition, config),
            sink,
            policy: RowErrorPolicy::default(),
            rows_written: 0,
            rows_skipped: 0,
        }
    }

    pub fn with_policy(mut self, policy: RowErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn definition(&self) -> &Arc<TableDefinition> {
        self.projector.definition()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    /// Project one raw row and append it
    pub fn write_row(&mut self, raw_row: Value, parent: &ParentContext) -> Result<()> {
        match self.projector.project(raw_row, parent) {
            Ok(row) => self.write_output(&row),
            Err(e) if e.kind() == ErrorKind::MalformedInput && self.policy == RowErrorPolicy::Skip => {
                tracing::warn!(table = %self.definition().name, error = %e, "skipping row");
                self.rows_skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Append rows in input order, all sharing the same parent context
    pub fn write_rows<I>(&mut self, raw_rows: I, parent: &ParentContext) -> Result<()>
    where
        I: IntoIterator<Item = Value>,
    {
        for row in raw_rows {
            self.write_row(row, parent)?;
        }
        Ok(())
    }

    /// Append an already projected row
    pub fn write_output(&mut self, row: &OutputRow) -> Result<()> {
        self.sink.write_record(row.values())?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying sink
    pub fn into_inner(self) -> Result<W> {
        self.sink.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

/// Write `<name>.csv.manifest` for a table
pub fn write_manifest(dir: &Path, definition: &TableDefinition) -> Result<PathBuf> {
    let path = dir.join(format!("{}.manifest", definition.file_name()));
    let sink_error = |source| Error::Sink {
        table: definition.name.clone(),
        path: path.clone(),
        source,
    };

    let mut file = File::create(&path).map_err(sink_error)?;
    serde_json::to_writer(&mut file, &definition.manifest())?;
    file.flush().map_err(sink_error)?;
    Ok(path)
}
