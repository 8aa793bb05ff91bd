//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::{CATALOG_COLUMNS, CATALOG_TABLE, ENTITY_PATH_FIELD};
use crate::paths::DEFAULT_BASE_PATH;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where the installation lives today.
    #[serde(default)]
    pub install: InstallConfig,

    /// Where stored paths should point after the migration.
    #[serde(default)]
    pub target: TargetConfig,

    /// Master catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Per-entity tables and the path columns to rewrite in each.
    #[serde(default = "default_tables")]
    pub tables: Vec<TableConfig>,

    /// Run behavior.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install: InstallConfig::default(),
            target: TargetConfig::default(),
            catalog: CatalogConfig::default(),
            tables: default_tables(),
            migration: MigrationConfig::default(),
        }
    }
}

/// Source installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Drive letter of the installation (default: C).
    #[serde(default = "default_drive")]
    pub drive: String,

    /// Installation subpath below the drive (default: `Compacw\Empresas`).
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Local directory to read the installation from, when the Windows path
    /// is not reachable as-is (e.g. a mounted volume).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            drive: default_drive(),
            base_path: default_base_path(),
            root: None,
        }
    }
}

/// Destination kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A local drive.
    #[default]
    Local,
    /// A network share.
    Network,
}

/// Destination of the rewritten paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Local or network target (default: local).
    #[serde(default)]
    pub mode: TargetKind,

    /// Local mode: destination drive (default: the install drive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive: Option<String>,

    /// Network mode: server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Network mode: path on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_path: Option<String>,

    /// Explicit target base. Takes precedence over the other fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

/// Master catalog settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog table name (default: MGW00001).
    #[serde(default = "default_catalog_table")]
    pub table: String,

    /// Field holding each entity's data path (default: CRUTADATOS).
    #[serde(default = "default_entity_path_field")]
    pub entity_path_field: String,

    /// Catalog columns rewritten toward the target.
    #[serde(default = "default_catalog_columns")]
    pub columns: Vec<String>,

    /// Rewrite the catalog's own path columns (default: true).
    #[serde(default = "default_true")]
    pub rewrite: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            table: default_catalog_table(),
            entity_path_field: default_entity_path_field(),
            columns: default_catalog_columns(),
            rewrite: true,
        }
    }
}

/// One per-entity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name, with or without `.dbf`.
    pub name: String,

    /// Path columns to rewrite.
    pub columns: Vec<String>,
}

impl TableConfig {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Run behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Write the change report to this file after the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<PathBuf>,
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub drive: Option<String>,
    pub base_path: Option<String>,
    pub root: Option<PathBuf>,
    pub target_drive: Option<String>,
    pub host: Option<String>,
    pub share_path: Option<String>,
    pub target_base: Option<String>,
    pub skip_catalog: bool,
}

fn default_tables() -> Vec<TableConfig> {
    vec![
        TableConfig::new("mgw10006", &["CFORMAPR01", "CREPIMPCFD", "CPLAMIGCFD", "CRUTAENT01"]),
        TableConfig::new("mgw10000", &["CRUTAPLA01", "CRUTAPLA02", "CRUTAENT01"]),
    ]
}

fn default_drive() -> String {
    "C".to_string()
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_catalog_table() -> String {
    CATALOG_TABLE.to_string()
}

fn default_entity_path_field() -> String {
    ENTITY_PATH_FIELD.to_string()
}

fn default_catalog_columns() -> Vec<String> {
    CATALOG_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_true() -> bool {
    true
}
