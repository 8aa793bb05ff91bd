//! File-based state management for resume capability.
//!
//! Tables are keyed by scope and table name: `catalog/mgw00001` for the
//! catalog, `<entity>/<table>` for entity tables.

use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Migration state for resume capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// Current run status.
    pub status: RunStatus,

    /// Per-table state.
    pub tables: BTreeMap<String, TableState>,

    /// When the migration completed (if finished).
    pub completed_at: Option<DateTime<Utc>>,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using config_hash as key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Per-table state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableState {
    /// Task status.
    pub status: TaskStatus,

    /// Fields changed in this table.
    #[serde(default)]
    pub changes: usize,

    /// When the table was finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// State key of a table.
pub fn table_key(scope: &str, table: &str) -> String {
    format!("{}/{}", scope, table.to_ascii_lowercase())
}

impl MigrationState {
    /// Create a new migration state.
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            status: RunStatus::Running,
            tables: BTreeMap::new(),
            completed_at: None,
            hmac: None, // Computed on first save
        }
    }

    /// Compute HMAC-SHA256 signature for state integrity validation.
    ///
    /// Uses config_hash as the key, so a state file cannot be edited without
    /// also knowing the configuration it belongs to.
    fn compute_hmac(&self) -> Result<String> {
        let mut state_for_signing = self.clone();
        state_for_signing.hmac = None;

        let content = serde_json::to_string(&state_for_signing).map_err(|e| {
            MigrateError::State(format!("Failed to serialize state for HMAC: {}", e))
        })?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }

    /// Load state from a file with integrity validation.
    ///
    /// Files without a signature are accepted with a warning and signed on
    /// the next save.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        if let Some(stored_hmac) = &state.hmac {
            let expected_hmac = state.compute_hmac()?;
            if stored_hmac != &expected_hmac {
                return Err(MigrateError::State(
                    "integrity check failed: HMAC mismatch (possible tampering)".to_string(),
                ));
            }
        } else {
            tracing::warn!("State file has no HMAC signature, integrity cannot be verified");
        }

        Ok(state)
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate that the config hash matches for resume.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    /// Get or create table state.
    pub fn get_or_create_table(&mut self, key: &str) -> &mut TableState {
        self.tables
            .entry(key.to_string())
            .or_insert_with(TableState::new)
    }

    /// Check if a table is completed.
    pub fn is_table_completed(&self, key: &str) -> bool {
        self.tables
            .get(key)
            .map(|t| t.status == TaskStatus::Completed)
            .unwrap_or(false)
    }

    /// Number of completed tables.
    pub fn completed_count(&self) -> usize {
        self.tables
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Mark the migration as completed.
    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the migration as failed.
    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Prepare a loaded state for another pass.
    pub fn mark_resumed(&mut self) {
        self.status = RunStatus::Running;
        self.completed_at = None;
    }
}

impl TableState {
    /// Create a new table state.
    pub fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            changes: 0,
            completed_at: None,
            error: None,
        }
    }

    /// Mark the table as in progress.
    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
        self.error = None;
    }

    /// Mark the table as completed.
    pub fn mark_completed(&mut self, changes: usize) {
        self.status = TaskStatus::Completed;
        self.changes = changes;
        self.completed_at = Some(Utc::now());
        self.error = None;
    }

    /// Mark the table as failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
    }
}

impl Default for TableState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_state_save_load() {
        let mut state = MigrationState::new("test-run".into(), "abc123".into());
        state
            .get_or_create_table(&table_key("0001", "mgw10006.dbf"))
            .mark_completed(4);

        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let loaded = MigrationState::load(file.path()).unwrap();
        assert_eq!(loaded.run_id, "test-run");
        assert_eq!(loaded.config_hash, "abc123");
        assert!(loaded.is_table_completed("0001/mgw10006.dbf"));
        assert_eq!(loaded.tables["0001/mgw10006.dbf"].changes, 4);
    }

    #[test]
    fn test_table_key_lowercases_table() {
        assert_eq!(table_key("catalog", "MGW00001.DBF"), "catalog/mgw00001.dbf");
    }

    #[test]
    fn test_config_validation() {
        let state = MigrationState::new("test-run".into(), "abc123".into());
        assert!(state.validate_config("abc123").is_ok());
        assert!(matches!(
            state.validate_config("different"),
            Err(MigrateError::ConfigChanged)
        ));
    }

    #[test]
    fn test_state_json_format_pretty() {
        let mut state = MigrationState::new("test-run".into(), "hash".into());
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains('\n'), "JSON should be pretty-printed");
        assert!(content.contains("\"run_id\""));
        assert!(content.contains("\"hmac\""));
    }

    #[test]
    fn test_tampered_state_is_rejected() {
        let mut state = MigrationState::new("test-run".into(), "hash".into());
        state
            .get_or_create_table("0001/mgw10006.dbf")
            .mark_failed("Format error");
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        std::fs::write(file.path(), content.replace("\"failed\"", "\"completed\"")).unwrap();

        let err = MigrationState::load(file.path()).unwrap_err();
        assert!(matches!(err, MigrateError::State(_)));
    }

    #[test]
    fn test_unsigned_state_is_accepted() {
        let state = MigrationState::new("test-run".into(), "hash".into());
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string(&state).unwrap()).unwrap();

        let loaded = MigrationState::load(file.path()).unwrap();
        assert_eq!(loaded.run_id, "test-run");
    }

    #[test]
    fn test_state_with_error() {
        let mut state = MigrationState::new("test".into(), "hash".into());
        state
            .get_or_create_table("0002/mgw10000.dbf")
            .mark_failed("Table not found");

        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let loaded = MigrationState::load(file.path()).unwrap();
        let table = &loaded.tables["0002/mgw10000.dbf"];
        assert_eq!(table.status, TaskStatus::Failed);
        assert_eq!(table.error.as_deref(), Some("Table not found"));
        assert!(!loaded.is_table_completed("0002/mgw10000.dbf"));
        assert_eq!(loaded.completed_count(), 0);
    }

    #[test]
    fn test_resume_marks() {
        let mut state = MigrationState::new("run".into(), "hash".into());
        state.mark_failed();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.completed_at.is_some());
        state.mark_resumed();
        assert_eq!(state.status, RunStatus::Running);
        assert!(state.completed_at.is_none());
    }
}
