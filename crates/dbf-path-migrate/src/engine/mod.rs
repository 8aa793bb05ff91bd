//! Batch record update engine.
//!
//! [`BatchUpdateEngine::update_table`] rewrites the path columns of one
//! table: every record, every requested column, through
//! [`resolve`](crate::paths::resolve). Problems with a single field or record
//! are collected as [`FieldIssue`]s and never abort the table; only failing
//! to open it does.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::changelog::ChangeEntry;
use crate::core::{OpenMode, RecordStore, TableOpener};
use crate::error::{ErrorKind, Result};
use crate::paths::{resolve, PathConfig};

/// A non-fatal problem found while updating a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Result of updating one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    /// Table identifier (file name).
    pub table: String,
    /// Full path of the table file.
    pub path: String,
    /// Records scanned.
    pub records: usize,
    /// One entry per changed field.
    pub changes: Vec<ChangeEntry>,
    pub issues: Vec<FieldIssue>,
}

impl TableOutcome {
    fn new(table: &str, path: &Path) -> Self {
        Self {
            table: table.to_string(),
            path: path.display().to_string(),
            records: 0,
            changes: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Number of changed fields.
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Number of issues of the given kind.
    pub fn count_issues(&self, kind: ErrorKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Whether any issue was recorded.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Whether closing the table failed, leaving its writes unpersisted.
    pub fn flush_failed(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.kind == ErrorKind::WriteFailure && i.record_index.is_none())
    }

    fn issue(
        &mut self,
        kind: ErrorKind,
        record_index: Option<usize>,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.issues.push(FieldIssue {
            kind,
            record_index,
            field: field.map(str::to_string),
            message: message.into(),
        });
    }
}

/// Applies the path rewrite to table columns.
#[derive(Debug, Clone)]
pub struct BatchUpdateEngine<O: TableOpener> {
    opener: O,
    dry_run: bool,
}

impl<O: TableOpener> BatchUpdateEngine<O> {
    /// Create an engine that writes changes.
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            dry_run: false,
        }
    }

    /// In dry-run mode tables are opened read-only and nothing is written;
    /// the outcome lists what would change.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The opener used for every table.
    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Rewrite `columns` of every record in the table at `table_path`.
    ///
    /// Returns an error only when the table cannot be opened. Everything
    /// after that is reported through [`TableOutcome::issues`].
    pub fn update_table<S: AsRef<str>>(
        &self,
        table_path: &Path,
        columns: &[S],
        config: &PathConfig,
    ) -> Result<TableOutcome> {
        let mode = if self.dry_run {
            OpenMode::ReadOnly
        } else {
            OpenMode::ReadWrite
        };
        let mut store = self.opener.open(table_path, mode)?;
        let mut outcome = TableOutcome::new(store.name(), table_path);

        let mut present = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            match store.field(column) {
                Some(spec) => present.push((spec.name.clone(), spec.max_length)),
                None => {
                    warn!("{}: column {} not found, skipping it", outcome.table, column);
                    outcome.issue(
                        ErrorKind::UnknownColumn,
                        None,
                        Some(column),
                        format!("column {} not found in {}", column, outcome.table),
                    );
                }
            }
        }

        if !present.is_empty() {
            self.rewrite_records(&mut store, &present, config, &mut outcome);
        }

        if let Err(e) = store.close() {
            warn!("{}: failed to flush changes: {}", outcome.table, e);
            outcome.issue(ErrorKind::WriteFailure, None, None, e.to_string());
        }

        info!(
            "{}: {} records scanned, {} fields {}, {} issues",
            outcome.table,
            outcome.records,
            outcome.changes.len(),
            if self.dry_run { "would change" } else { "updated" },
            outcome.issues.len()
        );
        Ok(outcome)
    }

    fn rewrite_records(
        &self,
        store: &mut O::Store,
        columns: &[(String, usize)],
        config: &PathConfig,
        outcome: &mut TableOutcome,
    ) {
        let table = outcome.table.clone();

        for record in 0..store.record_count() {
            outcome.records += 1;

            for (field, max_length) in columns {
                let original = match store.get(record, field) {
                    Ok(value) => value.trim().to_string(),
                    Err(e) => {
                        warn!(
                            "{}: failed to read record {} field {}: {}; skipping the record",
                            table,
                            record + 1,
                            field,
                            e
                        );
                        outcome.issue(ErrorKind::Unexpected, Some(record), Some(field.as_str()), e.to_string());
                        break;
                    }
                };
                if original.is_empty() {
                    continue;
                }

                let mut updated = resolve(&original, config);
                let mut truncated = false;
                let length = updated.chars().count();
                if length > *max_length {
                    updated = updated.chars().take(*max_length).collect();
                    truncated = true;
                    warn!(
                        "{}: record {} field {}: new value is {} chars, truncated to {}",
                        table,
                        record + 1,
                        field,
                        length,
                        max_length
                    );
                    outcome.issue(
                        ErrorKind::Overflow,
                        Some(record),
                        Some(field.as_str()),
                        format!("{} chars truncated to {}", length, max_length),
                    );
                }

                if updated == original {
                    continue;
                }

                if !self.dry_run {
                    if let Err(e) = store.set(record, field, &updated) {
                        warn!(
                            "{}: record {} field {}: write rejected: {}",
                            table,
                            record + 1,
                            field,
                            e
                        );
                        outcome.issue(ErrorKind::WriteFailure, Some(record), Some(field.as_str()), e.to_string());
                        continue;
                    }
                }

                debug!("{}: record {} {}: {} -> {}", table, record + 1, field, original, updated);
                outcome.changes.push(ChangeEntry {
                    table: table.clone(),
                    record_index: record,
                    field: field.clone(),
                    before: original,
                    after: updated,
                    truncated,
                });
            }
        }
    }
}
