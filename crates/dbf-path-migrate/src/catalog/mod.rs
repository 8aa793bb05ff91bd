//! Entity discovery from the master catalog.
//!
//! The catalog stores one data path per entity. Those paths may already
//! point at a network share or at another drive; to reach the tables the
//! migration always works from the local installation root. This module
//! produces that local view. It never yields the persisted target form,
//! which is [`resolve`](crate::paths::resolve)'s job.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::{OpenMode, RecordStore, TableOpener};
use crate::error::{MigrateError, Result};
use crate::paths::{is_absolute, normalize_separators, PathConfig, SEP};

/// Default catalog table name.
pub const CATALOG_TABLE: &str = "MGW00001";

/// Default catalog field holding each entity's data path.
pub const ENTITY_PATH_FIELD: &str = "CRUTADATOS";

/// Default catalog columns rewritten toward the target.
pub const CATALOG_COLUMNS: [&str; 2] = ["CRUTADATOS", "CRUTARES01"];

/// An entity found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRoot {
    /// 0-based record index in the catalog.
    pub record_index: usize,
    /// Entity directory relative to the installation root, e.g. `0001`.
    pub name: String,
    /// Local Windows path, e.g. `C:\Compacw\Empresas\0001`.
    pub local_path: String,
}

/// Where a stored entity path lives on the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalView {
    /// The entity directory.
    Root { name: String, path: String },
    /// The value points at the installation directory itself.
    Container,
    /// Neither anchored nor absolute.
    Unresolvable,
}

/// Map a stored entity path onto the local installation root.
///
/// A value already under the run's target prefix, or containing the base
/// path or the anchor token, is re-rooted under [`PathConfig::local_root`]
/// whatever drive or host it currently names. The target prefix is checked
/// first so a target that itself contains the anchor maps back to the same
/// entity. An absolute value without the anchor is taken as-is.
pub fn local_view(stored: &str, config: &PathConfig) -> LocalView {
    let normalized = normalize_separators(stored.trim());

    let suffix = config
        .suffix_after_target(&normalized)
        .or_else(|| config.suffix_after_anchor(&normalized));
    if let Some(suffix) = suffix {
        let suffix = suffix.trim_end_matches(SEP);
        if suffix.is_empty() {
            return LocalView::Container;
        }
        return LocalView::Root {
            name: suffix.to_string(),
            path: format!("{}{}{}", config.local_root(), SEP, suffix),
        };
    }

    if is_absolute(&normalized) {
        let path = normalized.trim_end_matches(SEP);
        let name = path.rsplit(SEP).next().unwrap_or_default();
        let bare_host = path.starts_with(r"\\") && !path[2..].contains(SEP);
        if name.is_empty() || name.ends_with(':') || bare_host {
            return LocalView::Unresolvable;
        }
        return LocalView::Root {
            name: name.to_string(),
            path: path.to_string(),
        };
    }

    LocalView::Unresolvable
}

/// Read the entity roots from the catalog at `catalog_path`.
///
/// The catalog is opened read-only. Blank, unresolvable and duplicate values
/// are skipped with a warning; a missing `field` is an error since nothing
/// could be traversed.
pub fn extract_entity_roots<O: TableOpener>(
    opener: &O,
    catalog_path: &Path,
    field: &str,
    config: &PathConfig,
) -> Result<Vec<EntityRoot>> {
    let mut catalog = opener.open(catalog_path, OpenMode::ReadOnly)?;
    let table = catalog.name().to_string();

    if catalog.field(field).is_none() {
        return Err(MigrateError::UnknownColumn {
            table,
            column: field.to_string(),
        });
    }

    let mut roots: Vec<EntityRoot> = Vec::new();
    for record in 0..catalog.record_count() {
        let stored = match catalog.get(record, field) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: cannot read record {}: {}", table, record + 1, e);
                continue;
            }
        };
        if stored.trim().is_empty() {
            continue;
        }

        match local_view(&stored, config) {
            LocalView::Root { name, path } => {
                if roots.iter().any(|r| r.local_path.eq_ignore_ascii_case(&path)) {
                    warn!(
                        "{}: record {} repeats entity {}, skipping",
                        table,
                        record + 1,
                        path
                    );
                    continue;
                }
                debug!("{}: record {} -> {}", table, record + 1, path);
                roots.push(EntityRoot {
                    record_index: record,
                    name,
                    local_path: path,
                });
            }
            LocalView::Container => {
                warn!(
                    "{}: record {} points at the installation directory ({}), skipping",
                    table,
                    record + 1,
                    stored.trim()
                );
            }
            LocalView::Unresolvable => {
                warn!(
                    "{}: record {} has no recognizable entity path ({}), skipping",
                    table,
                    record + 1,
                    stored.trim()
                );
            }
        }
    }

    catalog.close()?;
    info!("Found {} entities in {}", roots.len(), table);
    Ok(roots)
}
