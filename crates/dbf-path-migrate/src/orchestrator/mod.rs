//! Migration orchestrator - main workflow coordinator.
//!
//! A run locates the catalog, reads the entity roots from it, rewrites the
//! catalog's own path columns and then every configured table of every
//! entity. A failing table is recorded and the run moves on; only a missing
//! or unreadable catalog stops it.

use crate::catalog::{extract_entity_roots, EntityRoot};
use crate::changelog::{ChangeLog, Scope};
use crate::config::{Config, TableConfig};
use crate::core::TableOpener;
use crate::drivers::{locate_table, DbfOpener};
use crate::engine::BatchUpdateEngine;
use crate::error::{ErrorKind, Result};
use crate::paths::{strip_component_prefix, PathConfig, SEP};
use crate::state::{table_key, MigrationState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// State scope of the catalog table.
const CATALOG_SCOPE: &str = "catalog";

/// Migration orchestrator.
pub struct Orchestrator<O: TableOpener = DbfOpener> {
    config: Config,
    opener: O,
    state_file: Option<PathBuf>,
    state: Option<MigrationState>,
    progress: bool,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed` or `failed`.
    pub status: String,

    /// Whether tables were left untouched.
    pub dry_run: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Local installation root.
    pub local_root: String,

    /// Target base the paths were rewritten to.
    pub target_base: String,

    /// Fields changed in the catalog.
    pub catalog_changes: usize,

    /// Entities found in the catalog.
    pub entities_total: usize,

    /// Entities whose tables were all processed.
    pub entities_ok: usize,

    /// Entities with at least one failed table.
    pub entities_with_errors: usize,

    /// Tables considered, catalog included.
    pub tables_total: usize,

    /// Tables processed in this run.
    pub tables_updated: usize,

    /// Tables skipped because a previous run completed them.
    pub tables_skipped: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Fields changed across all tables.
    pub changes_total: usize,

    /// Values truncated to their field width.
    pub overflow_count: usize,

    /// Non-fatal issues across all tables.
    pub issues_total: usize,

    /// State keys of the failed tables.
    pub failed_tables: Vec<String>,

    /// Every change made.
    pub changes: ChangeLog,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One progress line, written as JSON to stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// `catalog`, `entity`, `table` or `complete`.
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// 1-based index of the current entity.
    pub entity_index: usize,
    pub entities_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Changes made so far.
    pub changes_total: usize,
}

/// An entity and the presence of its tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStatus {
    pub root: EntityRoot,
    /// Directory the tables are read from.
    pub directory: PathBuf,
    pub tables: Vec<TablePresence>,
}

/// Whether a configured table exists for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePresence {
    pub name: String,
    pub found: bool,
}

#[derive(Debug, Default)]
struct RunTotals {
    tables_total: usize,
    tables_updated: usize,
    tables_skipped: usize,
    failed_tables: Vec<String>,
    overflow_count: usize,
    issues_total: usize,
}

impl Orchestrator<DbfOpener> {
    /// Create a new orchestrator over DBF tables.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_opener(config, DbfOpener)
    }
}

impl<O: TableOpener> Orchestrator<O> {
    /// Create an orchestrator with a custom table opener.
    pub fn with_opener(config: Config, opener: O) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            opener,
            state_file: None,
            state: None,
            progress: false,
        })
    }

    /// Set the state file path for resume capability.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Load existing state for resume.
    pub fn resume(mut self) -> Result<Self> {
        if let Some(ref path) = self.state_file {
            if path.exists() {
                let mut state = MigrationState::load(path)?;
                state.validate_config(&self.config.hash())?;
                state.mark_resumed();
                info!(
                    "Resuming from state file: {:?} ({} tables already completed)",
                    path,
                    state.completed_count()
                );
                self.state = Some(state);
            }
        }
        Ok(self)
    }

    /// Print progress updates as JSON lines to stderr.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Catalog table path under the installation directory.
    pub fn catalog_path(&self, paths: &PathConfig) -> Result<PathBuf> {
        let install_dir = self.config.install_dir(paths);
        locate_table(&install_dir, &self.config.catalog.table)
    }

    /// Directory holding an entity's tables.
    ///
    /// With `install.root` configured the entity is looked up below it by
    /// name; otherwise its local Windows path is used directly. An entity
    /// stored outside the installation (e.g. `E:\Otra\Empresa9`) is named
    /// after its last component, so under `install.root` it maps to
    /// `<root>/Empresa9`; that mapping is logged as a warning.
    pub fn entity_dir(&self, entity: &EntityRoot) -> PathBuf {
        let Some(root) = &self.config.install.root else {
            return PathBuf::from(&entity.local_path);
        };

        let installed = self.config.path_config().is_ok_and(|paths| {
            strip_component_prefix(&entity.local_path, &paths.local_root()).is_some()
        });
        let dir = entity
            .name
            .split(SEP)
            .filter(|part| !part.is_empty())
            .fold(root.clone(), |dir, part| dir.join(part));
        if !installed {
            warn!(
                "Entity {} lies outside the installation, using {}",
                entity.local_path,
                dir.display()
            );
        }
        dir
    }

    /// Entities listed in the catalog and which of their tables exist.
    pub fn list_entities(&self) -> Result<Vec<EntityStatus>> {
        let paths = self.config.path_config()?;
        let catalog_path = self.catalog_path(&paths)?;
        let roots = extract_entity_roots(
            &self.opener,
            &catalog_path,
            &self.config.catalog.entity_path_field,
            &paths,
        )?;

        Ok(roots
            .into_iter()
            .map(|root| {
                let directory = self.entity_dir(&root);
                let tables = self
                    .config
                    .tables
                    .iter()
                    .map(|t| TablePresence {
                        name: t.name.clone(),
                        found: locate_table(&directory, &t.name).is_ok(),
                    })
                    .collect();
                EntityStatus {
                    root,
                    directory,
                    tables,
                }
            })
            .collect())
    }

    /// Run the migration.
    ///
    /// In dry-run mode tables are opened read-only, the result lists what
    /// would change, and the state file is left alone.
    pub fn run(mut self, dry_run: bool) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let mut state = self.state.take().unwrap_or_else(|| {
            MigrationState::new(uuid::Uuid::new_v4().to_string(), self.config.hash())
        });
        let run_id = state.run_id.clone();

        info!(
            "Starting path migration run: {}{}",
            run_id,
            if dry_run { " (dry run)" } else { "" }
        );

        let paths = self.config.path_config()?;
        info!("Local root: {}", paths.local_root());
        info!("Target base: {}", paths.target_base());

        // Phase 1: Locate the catalog and read the entities
        let (catalog_path, entities) = match self.discover(&paths) {
            Ok(found) => found,
            Err(e) => {
                if !dry_run {
                    state.mark_failed();
                    self.save_state(&mut state)?;
                }
                return Err(e);
            }
        };
        if entities.is_empty() {
            warn!("No entities found in {}", catalog_path.display());
        }

        let engine = BatchUpdateEngine::new(&self.opener).with_dry_run(dry_run);
        let mut changes = ChangeLog::new();
        let mut totals = RunTotals::default();

        // Phase 2: Rewrite the catalog's own path columns
        let mut catalog_changes = 0;
        if self.config.catalog.rewrite {
            self.emit_progress("catalog", None, 0, entities.len(), None, changes.total());
            let table = TableConfig {
                name: self.config.catalog.table.clone(),
                columns: self.config.catalog.columns.clone(),
            };
            let before = changes.total();
            self.process_table(
                &engine,
                Scope::Catalog,
                CATALOG_SCOPE,
                Ok(catalog_path.clone()),
                &table,
                &paths,
                dry_run,
                &mut state,
                &mut changes,
                &mut totals,
            )?;
            catalog_changes = changes.total() - before;
        } else {
            info!("Skipping catalog rewrite");
        }

        // Phase 3: Rewrite every entity's tables
        let mut entities_with_errors = 0;
        for (index, entity) in entities.iter().enumerate() {
            info!(
                "Entity {}/{}: {} ({})",
                index + 1,
                entities.len(),
                entity.name,
                entity.local_path
            );
            self.emit_progress(
                "entity",
                Some(&entity.name),
                index + 1,
                entities.len(),
                None,
                changes.total(),
            );

            let dir = self.entity_dir(entity);
            let failed_before = totals.failed_tables.len();
            for table in &self.config.tables {
                self.emit_progress(
                    "table",
                    Some(&entity.name),
                    index + 1,
                    entities.len(),
                    Some(&table.name),
                    changes.total(),
                );
                let table_path = locate_table(&dir, &table.name);
                self.process_table(
                    &engine,
                    Scope::Entity(entity.name.clone()),
                    &entity.name,
                    table_path,
                    table,
                    &paths,
                    dry_run,
                    &mut state,
                    &mut changes,
                    &mut totals,
                )?;
            }
            if totals.failed_tables.len() > failed_before {
                entities_with_errors += 1;
            }
        }

        // Build result
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let status = if totals.failed_tables.is_empty() {
            state.mark_completed();
            "completed"
        } else {
            state.mark_failed();
            "failed"
        };
        if !dry_run {
            self.save_state(&mut state)?;
        }
        self.emit_progress(
            "complete",
            None,
            entities.len(),
            entities.len(),
            None,
            changes.total(),
        );

        if let Some(report) = &self.config.migration.report_file {
            match changes.write_report(report) {
                Ok(()) => info!("Change report written to {}", report.display()),
                Err(e) => error!("Failed to write change report {}: {}", report.display(), e),
            }
        }

        let result = MigrationResult {
            run_id,
            status: status.to_string(),
            dry_run,
            duration_seconds: duration,
            started_at,
            completed_at,
            local_root: paths.local_root(),
            target_base: paths.target_base().to_string(),
            catalog_changes,
            entities_total: entities.len(),
            entities_ok: entities.len() - entities_with_errors,
            entities_with_errors,
            tables_total: totals.tables_total,
            tables_updated: totals.tables_updated,
            tables_skipped: totals.tables_skipped,
            tables_failed: totals.failed_tables.len(),
            changes_total: changes.total(),
            overflow_count: totals.overflow_count,
            issues_total: totals.issues_total,
            failed_tables: totals.failed_tables,
            changes,
        };

        info!(
            "Migration {}: {} entities, {}/{} tables, {} fields changed ({} truncated) in {:.1}s",
            result.status,
            result.entities_total,
            result.tables_updated,
            result.tables_total,
            result.changes_total,
            result.overflow_count,
            result.duration_seconds
        );

        Ok(result)
    }

    fn discover(&self, paths: &PathConfig) -> Result<(PathBuf, Vec<EntityRoot>)> {
        let catalog_path = self.catalog_path(paths)?;
        info!("Catalog: {}", catalog_path.display());
        let entities = extract_entity_roots(
            &self.opener,
            &catalog_path,
            &self.config.catalog.entity_path_field,
            paths,
        )?;
        Ok((catalog_path, entities))
    }

    /// Update one table and record the outcome. Table failures are recorded,
    /// not returned; only saving the state can fail.
    #[allow(clippy::too_many_arguments)]
    fn process_table(
        &self,
        engine: &BatchUpdateEngine<&O>,
        scope: Scope,
        scope_key: &str,
        path: Result<PathBuf>,
        table: &TableConfig,
        paths: &PathConfig,
        dry_run: bool,
        state: &mut MigrationState,
        changes: &mut ChangeLog,
        totals: &mut RunTotals,
    ) -> Result<()> {
        let key = table_key(scope_key, &table.name);
        totals.tables_total += 1;

        if state.is_table_completed(&key) {
            info!("{}: already completed, skipping", key);
            totals.tables_skipped += 1;
            return Ok(());
        }
        if !dry_run {
            state.get_or_create_table(&key).mark_in_progress();
        }

        match path.and_then(|p| engine.update_table(&p, &table.columns, paths)) {
            Ok(outcome) => {
                totals.overflow_count += outcome.count_issues(ErrorKind::Overflow);
                totals.issues_total += outcome.issues.len();

                // Unpersisted writes leave the table pending for resume.
                let unwritten = outcome.count_issues(ErrorKind::WriteFailure);
                if unwritten > 0 {
                    let message = if outcome.flush_failed() {
                        "changes could not be flushed to disk".to_string()
                    } else {
                        format!("{} field writes were rejected", unwritten)
                    };
                    error!("{}: {}", key, message);
                    totals.failed_tables.push(key.clone());
                    if !dry_run {
                        state.get_or_create_table(&key).mark_failed(&message);
                    }
                } else {
                    totals.tables_updated += 1;
                    if !dry_run {
                        state
                            .get_or_create_table(&key)
                            .mark_completed(outcome.change_count());
                    }
                }

                if !outcome.flush_failed() {
                    changes.append(scope, outcome.table, outcome.path, outcome.changes);
                }
            }
            Err(e) => {
                error!("{}: {}", key, e);
                totals.failed_tables.push(key.clone());
                if !dry_run {
                    state.get_or_create_table(&key).mark_failed(&e.to_string());
                }
            }
        }

        if !dry_run {
            self.save_state(state)?;
        }
        Ok(())
    }

    fn emit_progress(
        &self,
        phase: &str,
        entity: Option<&str>,
        entity_index: usize,
        entities_total: usize,
        table: Option<&str>,
        changes_total: usize,
    ) {
        if !self.progress {
            return;
        }
        let update = ProgressUpdate {
            phase: phase.to_string(),
            entity: entity.map(str::to_string),
            entity_index,
            entities_total,
            table: table.map(str::to_string),
            changes_total,
        };
        if let Ok(line) = serde_json::to_string(&update) {
            eprintln!("{}", line);
        }
    }

    /// Save state to file.
    fn save_state(&self, state: &mut MigrationState) -> Result<()> {
        if let Some(ref path) = self.state_file {
            state.save(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldSpec, OpenMode, RecordStore};
    use crate::drivers::DbfTable;
    use crate::error::MigrateError;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.install.root = Some(dir.path().to_path_buf());
        config.target.drive = Some("D".into());
        config
    }

    fn write_catalog(dir: &TempDir, values: &[&str]) {
        let rows: Vec<Vec<&str>> = values.iter().map(|v| vec![*v, ""]).collect();
        DbfTable::create(
            &dir.path().join("MGW00001.DBF"),
            &[
                FieldSpec::character("CRUTADATOS", 80),
                FieldSpec::character("CRUTARES01", 80),
            ],
            &rows,
        )
        .unwrap();
    }

    #[test]
    fn test_entity_dir_uses_install_root() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(config_for(&dir)).unwrap();
        let entity = EntityRoot {
            record_index: 0,
            name: r"Grupo\0001".into(),
            local_path: r"C:\Compacw\Empresas\Grupo\0001".into(),
        };
        assert_eq!(
            orchestrator.entity_dir(&entity),
            dir.path().join("Grupo").join("0001")
        );

        let plain = Orchestrator::new(Config::default()).unwrap();
        assert_eq!(
            plain.entity_dir(&entity),
            PathBuf::from(r"C:\Compacw\Empresas\Grupo\0001")
        );
    }

    #[test]
    fn test_entity_outside_installation_maps_by_last_component() {
        let dir = TempDir::new().unwrap();
        write_catalog(&dir, &[r"E:\Otra\Empresa9"]);
        let orchestrator = Orchestrator::new(config_for(&dir)).unwrap();

        let entities = orchestrator.list_entities().unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].root.name, "Empresa9");
        assert_eq!(entities[0].root.local_path, r"E:\Otra\Empresa9");
        assert_eq!(entities[0].directory, dir.path().join("Empresa9"));
        assert!(entities[0].tables.iter().all(|t| !t.found));

        let plain = Orchestrator::new(Config::default()).unwrap();
        assert_eq!(
            plain.entity_dir(&entities[0].root),
            PathBuf::from(r"E:\Otra\Empresa9")
        );
    }

    #[test]
    fn test_missing_catalog_aborts_run() {
        let dir = TempDir::new().unwrap();
        let err = Orchestrator::new(config_for(&dir))
            .unwrap()
            .run(false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_catalog_completes_with_no_work() {
        let dir = TempDir::new().unwrap();
        write_catalog(&dir, &[]);

        let result = Orchestrator::new(config_for(&dir)).unwrap().run(false).unwrap();
        assert_eq!(result.status, "completed");
        assert_eq!(result.entities_total, 0);
        assert_eq!(result.tables_total, 1);
        assert_eq!(result.changes_total, 0);
    }

    #[test]
    fn test_list_entities_reports_missing_tables() {
        let dir = TempDir::new().unwrap();
        write_catalog(&dir, &[r"C:\Compacw\Empresas\0001"]);
        std::fs::create_dir(dir.path().join("0001")).unwrap();
        DbfTable::create(
            &dir.path().join("0001").join("MGW10000.DBF"),
            &[FieldSpec::character("CRUTAPLA01", 40)],
            &[vec![""]],
        )
        .unwrap();

        let entities = Orchestrator::new(config_for(&dir))
            .unwrap()
            .list_entities()
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].root.name, "0001");
        let found: Vec<_> = entities[0].tables.iter().map(|t| (t.name.as_str(), t.found)).collect();
        assert_eq!(found, vec![("mgw10006", false), ("mgw10000", true)]);
    }

    /// DBF table whose close fails.
    struct UnflushableTable {
        inner: DbfTable,
        fail_close: bool,
    }

    impl RecordStore for UnflushableTable {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn mode(&self) -> OpenMode {
            self.inner.mode()
        }

        fn fields(&self) -> &[FieldSpec] {
            self.inner.fields()
        }

        fn record_count(&self) -> usize {
            self.inner.record_count()
        }

        fn get(&self, record: usize, field: &str) -> Result<String> {
            self.inner.get(record, field)
        }

        fn set(&mut self, record: usize, field: &str, value: &str) -> Result<()> {
            self.inner.set(record, field, value)
        }

        fn close(&mut self) -> Result<()> {
            if self.fail_close {
                return Err(MigrateError::write_failure(self.inner.name(), "", "disk full"));
            }
            self.inner.close()
        }
    }

    /// Opens DBF tables, failing the flush of the named one.
    struct UnflushableOpener {
        table: &'static str,
    }

    impl TableOpener for UnflushableOpener {
        type Store = UnflushableTable;

        fn open(&self, path: &Path, mode: OpenMode) -> Result<UnflushableTable> {
            let inner = DbfOpener.open(path, mode)?;
            let fail_close = mode == OpenMode::ReadWrite
                && path
                    .file_stem()
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(self.table));
            Ok(UnflushableTable { inner, fail_close })
        }
    }

    #[test]
    fn test_flush_failure_leaves_table_pending() {
        let dir = TempDir::new().unwrap();
        write_catalog(&dir, &[r"C:\Compacw\Empresas\0001"]);
        let entity = dir.path().join("0001");
        std::fs::create_dir(&entity).unwrap();
        DbfTable::create(
            &entity.join("MGW10006.DBF"),
            &[FieldSpec::character("CRUTAENT01", 80)],
            &[vec![r"C:\Compacw\Empresas\0001\XML"]],
        )
        .unwrap();
        DbfTable::create(
            &entity.join("MGW10000.DBF"),
            &[FieldSpec::character("CRUTAPLA01", 80)],
            &[vec![r"C:\Compacw\Empresas\0001\Plantillas"]],
        )
        .unwrap();
        let state_file = dir.path().join("state.json");

        let result = Orchestrator::with_opener(config_for(&dir), UnflushableOpener { table: "mgw10006" })
            .unwrap()
            .with_state_file(state_file.clone())
            .run(false)
            .unwrap();

        assert_eq!(result.status, "failed");
        assert_eq!(result.failed_tables, vec!["0001/mgw10006".to_string()]);
        assert_eq!(result.tables_updated, 2);
        assert_eq!(result.entities_with_errors, 1);
        assert_eq!(result.changes.count_for_table("MGW10006.DBF"), 0);

        let state = MigrationState::load(&state_file).unwrap();
        assert!(!state.is_table_completed("0001/mgw10006"));
        assert!(state.is_table_completed("0001/mgw10000"));
        assert!(state.is_table_completed("catalog/mgw00001"));

        // The failed table is retried on resume.
        let resumed = Orchestrator::new(config_for(&dir))
            .unwrap()
            .with_state_file(state_file)
            .resume()
            .unwrap()
            .run(false)
            .unwrap();
        assert_eq!(resumed.status, "completed");
        assert_eq!(resumed.tables_skipped, 2);
        assert_eq!(resumed.tables_updated, 1);
    }

    #[test]
    fn test_progress_update_serializes_compactly() {
        let update = ProgressUpdate {
            phase: "table".into(),
            entity: Some("0001".into()),
            entity_index: 1,
            entities_total: 2,
            table: Some("mgw10006".into()),
            changes_total: 3,
        };
        let line = serde_json::to_string(&update).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"phase\":\"table\""));
    }
}
