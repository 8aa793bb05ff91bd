//! # dbf-path-migrate
//!
//! Rewrites the file locations stored inside dBase/FoxPro tables so an
//! installation can move between a local drive and a network share.
//!
//! This library provides:
//!
//! - **Path rewriting** that re-roots stored Windows paths (drive letter or
//!   UNC) under a new target base, idempotently
//! - **Batch updates** of path columns with truncation to field widths and
//!   per-field error isolation
//! - **Catalog traversal** from the master catalog to every entity's tables
//! - **Change logs** with a before/after report
//! - **Resume capability** via JSON state files
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbf_path_migrate::{Config, Orchestrator};
//!
//! fn main() -> dbf_path_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(false)?;
//!     println!("Changed {} fields", result.changes_total);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod changelog;
pub mod config;
pub mod core;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod paths;
pub mod state;

// Re-exports for convenient access
pub use catalog::{extract_entity_roots, local_view, EntityRoot, LocalView};
pub use changelog::{ChangeEntry, ChangeLog, Scope};
pub use config::{Config, Overrides, TableConfig, TargetKind};
pub use self::core::{FieldKind, FieldSpec, OpenMode, RecordStore, TableOpener};
pub use drivers::{DbfOpener, DbfTable};
pub use engine::{BatchUpdateEngine, FieldIssue, TableOutcome};
pub use error::{ErrorKind, MigrateError, Result};
pub use orchestrator::{EntityStatus, MigrationResult, Orchestrator, ProgressUpdate};
pub use paths::{resolve, transform, PathConfig, TransformResult};
pub use state::MigrationState;
