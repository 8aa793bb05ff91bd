//! dBase III / FoxPro table driver.
//!
//! Implements [`RecordStore`](crate::core::RecordStore) over `.dbf` files.
//! Only character fields can be written; other field types are readable as
//! their stored text.

mod header;
mod table;

pub use header::{FieldLayout, Header};
pub use table::DbfTable;

use std::path::{Path, PathBuf};

use crate::core::{OpenMode, TableOpener};
use crate::error::{MigrateError, Result};

/// File extension of DBF tables.
pub const DBF_EXTENSION: &str = "dbf";

/// Opens [`DbfTable`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbfOpener;

impl TableOpener for DbfOpener {
    type Store = DbfTable;

    fn open(&self, path: &Path, mode: OpenMode) -> Result<DbfTable> {
        DbfTable::open(path, mode)
    }
}

/// Find table `name` in `dir`, ignoring case.
///
/// `name` may be given with or without the `.dbf` extension. The tables are
/// written by Windows software, so `MGW00001.DBF` and `mgw00001.dbf` name the
/// same table.
pub fn locate_table(dir: &Path, name: &str) -> Result<PathBuf> {
    let wanted = if Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DBF_EXTENSION))
    {
        name.to_string()
    } else {
        format!("{}.{}", name, DBF_EXTENSION)
    };

    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MigrateError::NotFound(dir.display().to_string()),
        _ => MigrateError::Io(e),
    })?;

    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(&wanted) {
            return Ok(entry.path());
        }
    }

    Err(MigrateError::NotFound(dir.join(wanted).display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldSpec, RecordStore};
    use tempfile::TempDir;

    #[test]
    fn test_locate_table_ignores_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MGW00001.DBF");
        DbfTable::create(&path, &[FieldSpec::character("CRUTADATOS", 20)], &[vec!["x"]]).unwrap();

        assert_eq!(locate_table(dir.path(), "mgw00001").unwrap(), path);
        assert_eq!(locate_table(dir.path(), "MGW00001.dbf").unwrap(), path);
    }

    #[test]
    fn test_locate_table_missing() {
        let dir = TempDir::new().unwrap();
        let err = locate_table(dir.path(), "mgw10006").unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(_)));

        let err = locate_table(&dir.path().join("0001"), "mgw10006").unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(_)));
    }

    #[test]
    fn test_opener_opens_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mgw10006.dbf");
        DbfTable::create(&path, &[FieldSpec::character("CFORMAPR01", 20)], &[vec!["a"], vec!["b"]])
            .unwrap();

        let table = DbfOpener.open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(table.record_count(), 2);
        assert_eq!(table.mode(), OpenMode::ReadOnly);
    }
}
