//! Metadata extraction: API responses in, registry tables out
//!
//! An [`Extractor`] reads the run [`Parameters`], walks each project's
//! enabled datasets through a [`MetadataSource`] and writes every row into
//! one [`crate::table::TableCatalog`]. Cursors for incremental datasets live
//! in [`RunState`].

pub mod config;
pub mod datasets;
pub mod runner;
pub mod source;
pub mod state;

pub use config::{resolve_stack, ConfigFile, Datasets, OrganizationConfig, Parameters, ProjectConfig};
pub use datasets::ProjectRun;
pub use runner::{Extractor, RunReport};
pub use source::{DirectorySource, Endpoint, MemorySource, MetadataSource, Scope};
pub use state::{project_key, RunState};
