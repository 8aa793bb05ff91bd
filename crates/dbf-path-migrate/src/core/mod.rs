//! Core abstractions for table access.
//!
//! - [`schema`]: field and open-mode types
//! - [`traits`]: [`RecordStore`] and [`TableOpener`]
//!
//! The engine, the catalog extractor and the orchestrator are written
//! against these traits only, so they can be exercised against any table
//! implementation.

pub mod schema;
pub mod traits;

pub use schema::{FieldKind, FieldSpec, OpenMode};
pub use traits::{RecordStore, TableOpener};
