//! Table metadata types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a table is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::ReadOnly => f.write_str("read-only"),
            OpenMode::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// Field type as declared in the table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Fixed-width text (`C`).
    Character,
    /// Numeric stored as text (`N`, `F`).
    Numeric,
    /// Date stored as `YYYYMMDD` (`D`).
    Date,
    /// Logical (`L`).
    Logical,
    /// Memo block reference (`M`).
    Memo,
    /// Any other type letter.
    Other(char),
}

impl FieldKind {
    /// Decode a header type letter.
    pub fn from_code(code: u8) -> Self {
        match code.to_ascii_uppercase() {
            b'C' => FieldKind::Character,
            b'N' | b'F' => FieldKind::Numeric,
            b'D' => FieldKind::Date,
            b'L' => FieldKind::Logical,
            b'M' => FieldKind::Memo,
            other => FieldKind::Other(other as char),
        }
    }

    /// Header type letter.
    pub fn code(&self) -> u8 {
        match self {
            FieldKind::Character => b'C',
            FieldKind::Numeric => b'N',
            FieldKind::Date => b'D',
            FieldKind::Logical => b'L',
            FieldKind::Memo => b'M',
            FieldKind::Other(c) => *c as u8,
        }
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as stored (uppercase in practice).
    pub name: String,
    /// Field type.
    pub kind: FieldKind,
    /// Fixed width in characters.
    pub max_length: usize,
}

impl FieldSpec {
    /// Create a character field.
    pub fn character(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Character,
            max_length,
        }
    }

    /// Create a field of any kind.
    pub fn new(name: impl Into<String>, kind: FieldKind, max_length: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            max_length,
        }
    }
}
