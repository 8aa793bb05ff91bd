//! Error types for the path migration library.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for table format errors.
pub const EXIT_FORMAT_ERROR: u8 = 2;
/// Exit code for missing tables or catalog.
pub const EXIT_NOT_FOUND: u8 = 3;
/// Exit code for rejected writes.
pub const EXIT_WRITE_FAILURE: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for everything else.
pub const EXIT_UNEXPECTED: u8 = 10;

/// Coarse classification of a failure, used to decide whether the current
/// field, record or table is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Table or catalog file missing.
    NotFound,
    /// Structural or read error reported by the table layer.
    FormatError,
    /// Requested column absent from the table schema.
    UnknownColumn,
    /// Rewritten value longer than the field width.
    Overflow,
    /// Field assignment or flush rejected by the table layer.
    WriteFailure,
    /// Anything else.
    Unexpected,
}

impl ErrorKind {
    /// Whether this kind aborts the table it occurred in.
    pub fn aborts_table(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::FormatError | ErrorKind::Unexpected
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::FormatError => "format error",
            ErrorKind::UnknownColumn => "unknown column",
            ErrorKind::Overflow => "overflow",
            ErrorKind::WriteFailure => "write failure",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, bad drive letter, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table or catalog file missing
    #[error("Table not found: {0}")]
    NotFound(String),

    /// Table structure could not be read
    #[error("Format error in {table}: {message}")]
    Format { table: String, message: String },

    /// Column not present in the table schema
    #[error("Column {column} not found in {table}")]
    UnknownColumn { table: String, column: String },

    /// Value does not fit the field
    #[error("Value for {field} in {table} is {length} chars, field holds {max_length}")]
    Overflow {
        table: String,
        field: String,
        length: usize,
        max_length: usize,
    },

    /// Field assignment rejected
    #[error("Write failed for {table}.{field}: {message}")]
    WriteFailure {
        table: String,
        field: String,
        message: String,
    },

    /// Anything the other variants do not cover, with context
    #[error("Unexpected error in {context}: {message}")]
    Unexpected { context: String, message: String },

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since last run - cannot resume. Delete the state file to start fresh.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Format error for a table
    pub fn format(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Format {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a WriteFailure error
    pub fn write_failure(
        table: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::WriteFailure {
            table: table.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an Unexpected error with context about where it occurred
    pub fn unexpected(context: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Unexpected {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::NotFound(_) => ErrorKind::NotFound,
            MigrateError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            MigrateError::Format { .. } => ErrorKind::FormatError,
            MigrateError::UnknownColumn { .. } => ErrorKind::UnknownColumn,
            MigrateError::Overflow { .. } => ErrorKind::Overflow,
            MigrateError::WriteFailure { .. } => ErrorKind::WriteFailure,
            _ => ErrorKind::Unexpected,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Yaml(_)
            | MigrateError::ConfigChanged => EXIT_CONFIG_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Format { .. } => EXIT_FORMAT_ERROR,
            MigrateError::NotFound(_) => EXIT_NOT_FOUND,
            MigrateError::WriteFailure { .. } => EXIT_WRITE_FAILURE,
            _ => EXIT_UNEXPECTED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
