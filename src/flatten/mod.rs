//! JSON flattening - reduce nested API objects to flat key-path rows
//!
//! Object keys are joined into key-paths with a separator, lists stay opaque
//! unless list flattening is enabled, and selected keys can keep their whole
//! sub-tree.

pub mod flattener;
pub mod json_text;
pub mod types;

pub use flattener::JsonFlattener;
pub use json_text::{to_cell_text, to_json_text};
pub use types::{FlatRow, FlattenConfig, ParentContext};
