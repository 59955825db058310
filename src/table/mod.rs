//! Tabular projection - fixed-column CSV tables with manifests
//!
//! The registry names every logical table, the projector turns a raw object
//! into a row of that table and the writer appends rows to the table's file.
//! A [`TableCatalog`] owns the writers of a run.

pub mod catalog;
pub mod definition;
pub mod projector;
pub mod registry;
pub mod writer;

pub use catalog::{CatalogOptions, TableCatalog, TableSummary};
pub use definition::{Manifest, TableDefinition};
pub use projector::{OutputRow, RowProjector};
pub use registry::TableSchema;
pub use writer::{write_manifest, RowErrorPolicy, TableWriter};
