//! # Metaflat - API metadata to fixed-schema tables
//!
//! A library for turning nested JSON returned by a platform's management
//! APIs into flat, fixed-column CSV tables with manifests, ready for
//! incremental loading into a warehouse.
//!
//! ## Modules
//!
//! - **flatten**: Reduce nested objects to key-path rows
//! - **table**: Registry of logical tables, row projection and CSV writers
//! - **extract**: Dataset routines that stitch child rows to their parents
//!
//! ## Quick Start
//!
//! ### Flattening
//!
//! ```rust
//! use metaflat::flatten::{FlattenConfig, JsonFlattener};
//! use serde_json::json;
//!
//! let flattener = JsonFlattener::new(FlattenConfig::default());
//! let row = flattener.flatten(json!({"id": 1, "bucket": {"id": "in.c-main"}}));
//!
//! assert_eq!(row["bucket_id"], json!("in.c-main"));
//! ```
//!
//! ### Writing a registry table
//!
//! ```rust
//! use metaflat::flatten::{FlattenConfig, ParentContext};
//! use metaflat::table::{TableDefinition, TableWriter};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> metaflat::Result<()> {
//! let definition = Arc::new(TableDefinition::new(
//!     "tables-columns",
//!     &["table_id", "column"],
//!     &["table_id", "column"],
//! ));
//! let mut writer = TableWriter::from_writer(definition, FlattenConfig::default(), Vec::new());
//!
//! let parent = ParentContext::new().with("table_id", "in.c-main.users");
//! writer.write_row(json!({"column": "email"}), &parent)?;
//!
//! assert_eq!(writer.into_inner()?, b"\"in.c-main.users\",\"email\"\n");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result as AnyResult};
use serde_json::Value;
use std::io::{BufRead, Write};

pub mod error;
pub mod extract;
pub mod flatten;
pub mod table;

// Re-export commonly used types for convenience
pub use error::{Error, ErrorKind, Result};
pub use extract::{DirectorySource, Extractor, MetadataSource, Parameters, RunState};
pub use flatten::{FlatRow, FlattenConfig, JsonFlattener, ParentContext};
pub use table::{TableCatalog, TableDefinition, TableWriter};

/// Project a stream of newline-delimited JSON objects into a table.
///
/// Blank lines are skipped. Returns the number of rows read.
pub fn flatten_json_lines<R: BufRead, W: Write>(
    reader: R,
    writer: &mut TableWriter<W>,
    parent: &ParentContext,
) -> AnyResult<usize> {
    let mut count = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSON on line {}", idx + 1))?;

        writer.write_row(value, parent)?;
        count += 1;
    }

    writer.flush()?;
    Ok(count)
}
