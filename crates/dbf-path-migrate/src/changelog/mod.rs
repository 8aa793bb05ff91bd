//! Append-only audit log of field changes.
//!
//! Every rewritten field produces one [`ChangeEntry`]. Entries are appended
//! per table, tagged with the [`Scope`] (catalog or entity) they belong to,
//! and are never edited or removed.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

const RULE_WIDTH: usize = 80;

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Table identifier (file name).
    pub table: String,
    /// 0-based insertion-order index of the record.
    pub record_index: usize,
    /// Field name.
    pub field: String,
    /// Value before the update (trimmed).
    pub before: String,
    /// Value written.
    pub after: String,
    /// Whether `after` was cut to the field width.
    #[serde(default)]
    pub truncated: bool,
}

/// What a group of tables belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Scope {
    /// The master catalog.
    Catalog,
    /// One entity, by name.
    Entity(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Catalog => f.write_str("catalog"),
            Scope::Entity(name) => write!(f, "entity {}", name),
        }
    }
}

/// Changes made to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChanges {
    pub scope: Scope,
    pub table: String,
    pub path: String,
    pub entries: Vec<ChangeEntry>,
}

/// The run's change log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    sections: Vec<TableChanges>,
}

impl ChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the changes of one table. Empty change lists are ignored.
    pub fn append(
        &mut self,
        scope: Scope,
        table: impl Into<String>,
        path: impl Into<String>,
        entries: Vec<ChangeEntry>,
    ) {
        if entries.is_empty() {
            return;
        }
        self.sections.push(TableChanges {
            scope,
            table: table.into(),
            path: path.into(),
            entries,
        });
    }

    /// Total number of entries.
    pub fn total(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Table sections in append order.
    pub fn sections(&self) -> &[TableChanges] {
        &self.sections
    }

    /// All entries in append order, with their scope.
    pub fn entries(&self) -> impl Iterator<Item = (&Scope, &ChangeEntry)> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter().map(move |e| (&s.scope, e)))
    }

    /// Number of entries for a table name across all scopes (case-insensitive).
    pub fn count_for_table(&self, table: &str) -> usize {
        self.sections
            .iter()
            .filter(|s| s.table.eq_ignore_ascii_case(table))
            .map(|s| s.entries.len())
            .sum()
    }

    /// Number of entries in one scope.
    pub fn count_for_scope(&self, scope: &Scope) -> usize {
        self.sections
            .iter()
            .filter(|s| &s.scope == scope)
            .map(|s| s.entries.len())
            .sum()
    }

    /// Number of entries whose value was truncated.
    pub fn truncated_count(&self) -> usize {
        self.entries().filter(|(_, e)| e.truncated).count()
    }

    /// Sections grouped by scope, scopes in order of first appearance.
    pub fn group_by_scope(&self) -> Vec<(&Scope, Vec<&TableChanges>)> {
        let mut groups: Vec<(&Scope, Vec<&TableChanges>)> = Vec::new();
        for section in &self.sections {
            match groups.iter_mut().find(|(scope, _)| *scope == &section.scope) {
                Some((_, tables)) => tables.push(section),
                None => groups.push((&section.scope, vec![section])),
            }
        }
        groups
    }

    /// Render a plain-text before/after report.
    pub fn render_report(&self) -> String {
        self.to_string()
    }

    /// Write the plain-text report to `out`, stopping at the first error.
    pub fn write_report_to<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        let thin = "-".repeat(RULE_WIDTH);

        writeln!(out, "{}", rule)?;
        writeln!(out, "PATH CHANGE LOG")?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "Total changes: {}", self.total())?;

        if self.is_empty() {
            return writeln!(out, "\nNo changes were made.");
        }

        for (scope, tables) in self.group_by_scope() {
            writeln!(out, "\n{}", rule)?;
            match scope {
                Scope::Catalog => writeln!(out, "CATALOG")?,
                Scope::Entity(name) => writeln!(out, "ENTITY: {}", name)?,
            }
            writeln!(out, "Changes: {}", self.count_for_scope(scope))?;
            writeln!(out, "{}", rule)?;

            for section in tables {
                writeln!(out, "\nTable: {} ({})", section.table, section.path)?;

                let mut current_record = None;
                for entry in &section.entries {
                    if current_record != Some(entry.record_index) {
                        current_record = Some(entry.record_index);
                        writeln!(out, "\n[Record #{}]", entry.record_index + 1)?;
                        writeln!(out, "{}", thin)?;
                    }
                    writeln!(out, "  Field: {}", entry.field)?;
                    writeln!(out, "    BEFORE: {}", entry.before)?;
                    writeln!(out, "    AFTER:  {}", entry.after)?;
                    if entry.truncated {
                        writeln!(out, "    (truncated to the field width)")?;
                    }
                }
            }
        }

        writeln!(out, "\n{}", rule)
    }

    /// Write the report to `path`.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.render_report())?;
        Ok(())
    }
}

impl fmt::Display for ChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_report_to(f)
    }
}
