//! Core traits for table access.
//!
//! - [`RecordStore`]: one open table, addressed by record index and field name
//! - [`TableOpener`]: opens a [`RecordStore`] for a file
//!
//! The engine only talks to these traits; the DBF driver in
//! [`crate::drivers::dbf`] is the production implementation.

use std::path::Path;

use crate::error::Result;

use super::schema::{FieldSpec, OpenMode};

/// One open table.
///
/// Records are addressed by their 0-based insertion-order index. Writes may
/// be buffered until [`RecordStore::close`], which must be called to persist
/// them. Implementations should still flush on drop as a last resort.
pub trait RecordStore {
    /// Table identifier used in logs and change entries (usually the file name).
    fn name(&self) -> &str;

    /// Mode the table was opened with.
    fn mode(&self) -> OpenMode;

    /// Field definitions in declaration order.
    fn fields(&self) -> &[FieldSpec];

    /// Look up a field by name (case-insensitive).
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Maximum character width of a field.
    fn max_length(&self, name: &str) -> Option<usize> {
        self.field(name).map(|f| f.max_length)
    }

    /// Number of records.
    fn record_count(&self) -> usize;

    /// Read a field of a record, with trailing padding removed.
    fn get(&self, record: usize, field: &str) -> Result<String>;

    /// Assign a field of a record.
    fn set(&mut self, record: usize, field: &str, value: &str) -> Result<()>;

    /// Flush pending writes and release the table.
    ///
    /// Calling it again after a successful close is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Opens tables.
pub trait TableOpener {
    /// Concrete table type.
    type Store: RecordStore;

    /// Open the table at `path`.
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Self::Store>;
}

impl<T: TableOpener + ?Sized> TableOpener for &T {
    type Store = T::Store;

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Self::Store> {
        (**self).open(path, mode)
    }
}
