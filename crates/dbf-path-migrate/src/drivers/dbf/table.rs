//! An open DBF table.
//!
//! The whole record area is read into memory on open. Assignments update
//! the in-memory copy and mark the record dirty; [`RecordStore::close`]
//! writes dirty records back in place, refreshes the last-update date and
//! syncs the file.
//!
//! Text is treated as a single-byte code page: each byte maps to the code
//! point of the same value and back, so bytes round-trip unchanged whatever
//! the table's real code page is.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, warn};

use super::header::{encode_date, FieldLayout, Header, EOF_MARKER};
use crate::core::{FieldKind, FieldSpec, OpenMode, RecordStore};
use crate::error::{MigrateError, Result};

/// Deletion flag of a live record.
const LIVE_RECORD: u8 = b' ';

/// Deletion flag of a deleted record.
const DELETED_RECORD: u8 = b'*';

/// An open DBF table.
pub struct DbfTable {
    name: String,
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    header: Header,
    fields: Vec<FieldSpec>,
    records: Vec<u8>,
    dirty: BTreeSet<usize>,
}

impl DbfTable {
    /// Open an existing table.
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let name = table_name(path);

        let file = match mode {
            OpenMode::ReadOnly => File::open(path),
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path),
        };
        let mut file = file.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::NotFound(path.display().to_string()),
            _ => MigrateError::Io(e),
        })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let header = Header::parse(&name, &bytes)?;
        let start = header.header_len;
        let end = start + header.record_len * header.record_count;
        let records = bytes[start..end].to_vec();
        let fields = header.fields.iter().map(|f| f.spec.clone()).collect();

        debug!(
            "Opened {} ({}): {} records, {} fields",
            name,
            mode,
            header.record_count,
            header.fields.len()
        );

        Ok(Self {
            name,
            path: path.to_path_buf(),
            mode,
            file: Some(file),
            header,
            fields,
            records,
            dirty: BTreeSet::new(),
        })
    }

    /// Write a new table with the given fields and rows.
    ///
    /// Each row holds one value per field, in field order. Values are padded
    /// to the field width; values that do not fit are rejected.
    pub fn create<S: AsRef<str>>(path: &Path, fields: &[FieldSpec], rows: &[Vec<S>]) -> Result<()> {
        let name = table_name(path);
        let header = Header::new(fields, rows.len(), Local::now().date_naive())?;

        let mut bytes = header.encode().to_vec();
        for (index, row) in rows.iter().enumerate() {
            if row.len() != fields.len() {
                return Err(MigrateError::Config(format!(
                    "row {} has {} values, {} has {} fields",
                    index,
                    row.len(),
                    name,
                    fields.len()
                )));
            }
            bytes.push(LIVE_RECORD);
            for (layout, value) in header.fields.iter().zip(row) {
                bytes.extend_from_slice(&encode_text(&name, &layout.spec, value.as_ref())?);
            }
        }
        bytes.push(EOF_MARKER);

        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Path the table was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a record carries the deletion flag.
    pub fn is_deleted(&self, record: usize) -> bool {
        self.record_bytes(record)
            .map(|r| r[0] == DELETED_RECORD)
            .unwrap_or(false)
    }

    /// Whether there are assignments not yet written to disk.
    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn record_bytes(&self, record: usize) -> Option<&[u8]> {
        let len = self.header.record_len;
        self.records.get(record * len..(record + 1) * len)
    }

    fn locate(&self, record: usize, field: &str) -> Result<(&FieldLayout, usize)> {
        if record >= self.header.record_count {
            return Err(MigrateError::unexpected(
                format!("{} record {}", self.name, record),
                format!("table has {} records", self.header.record_count),
            ));
        }
        let layout = self
            .header
            .field(field)
            .ok_or_else(|| MigrateError::UnknownColumn {
                table: self.name.clone(),
                column: field.to_string(),
            })?;
        Ok((layout, record * self.header.record_len + layout.offset))
    }

    fn flush(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        if self.dirty.is_empty() {
            return Ok(());
        }

        let len = self.header.record_len;
        for &record in &self.dirty {
            let offset = self.header.header_len + record * len;
            file.seek(SeekFrom::Start(offset as u64))?;
            file.write_all(&self.records[record * len..(record + 1) * len])?;
        }

        file.seek(SeekFrom::Start(1))?;
        file.write_all(&encode_date(Some(Local::now().date_naive())))?;
        file.sync_all()?;

        debug!("Flushed {} records to {}", self.dirty.len(), self.name);
        self.dirty.clear();
        Ok(())
    }
}

impl RecordStore for DbfTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn record_count(&self) -> usize {
        self.header.record_count
    }

    fn get(&self, record: usize, field: &str) -> Result<String> {
        let (layout, start) = self.locate(record, field)?;
        let raw = &self.records[start..start + layout.spec.max_length];
        let text: String = raw.iter().map(|&b| b as char).collect();
        Ok(text.trim_end_matches(&[' ', '\0'][..]).to_string())
    }

    fn set(&mut self, record: usize, field: &str, value: &str) -> Result<()> {
        if self.file.is_none() {
            return Err(MigrateError::write_failure(&self.name, field, "table is closed"));
        }
        if self.mode == OpenMode::ReadOnly {
            return Err(MigrateError::write_failure(
                &self.name,
                field,
                "table is open read-only",
            ));
        }

        let (layout, start) = self.locate(record, field)?;
        let encoded = encode_value(&self.name, layout, value)?;
        let end = start + encoded.len();
        self.records[start..end].copy_from_slice(&encoded);
        self.dirty.insert(record);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let result = self.flush();
        if result.is_ok() {
            self.file = None;
        }
        result
    }
}

impl Drop for DbfTable {
    fn drop(&mut self) {
        if self.file.is_some() && !self.dirty.is_empty() {
            warn!(
                "{} dropped with {} unwritten records, flushing",
                self.name,
                self.dirty.len()
            );
            if let Err(e) = self.flush() {
                error!("Failed to flush {}: {}", self.name, e);
            }
        }
    }
}

/// Encode a value for a character field, padded to the field width.
fn encode_value(table: &str, layout: &FieldLayout, value: &str) -> Result<Vec<u8>> {
    let spec = &layout.spec;
    if spec.kind != FieldKind::Character {
        return Err(MigrateError::write_failure(
            table,
            &spec.name,
            format!("field type {:?} is not a character field", spec.kind),
        ));
    }
    encode_text(table, spec, value)
}

/// Encode text one byte per character, padded with spaces to the field width.
fn encode_text(table: &str, spec: &FieldSpec, value: &str) -> Result<Vec<u8>> {
    let mut encoded = Vec::with_capacity(spec.max_length);
    for c in value.chars() {
        let code = c as u32;
        if code > 0xFF {
            return Err(MigrateError::write_failure(
                table,
                &spec.name,
                format!("character '{}' cannot be stored in the table code page", c),
            ));
        }
        encoded.push(code as u8);
    }

    if encoded.len() > spec.max_length {
        return Err(MigrateError::Overflow {
            table: table.to_string(),
            field: spec.name.clone(),
            length: encoded.len(),
            max_length: spec.max_length,
        });
    }

    encoded.resize(spec.max_length, b' ');
    Ok(encoded)
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::character("CRUTAENT01", 40),
            FieldSpec::character("CRUTAPLA01", 12),
            FieldSpec::new("CIDEMPRESA", FieldKind::Numeric, 4),
        ]
    }

    fn fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("mgw10000.dbf");
        DbfTable::create(
            &path,
            &fields(),
            &[
                vec![r"C:\Compacw\Empresas\Co1\xml", "corta", "   1"],
                vec!["", "", "   2"],
            ],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_open_reads_fields_and_values() {
        let dir = TempDir::new().unwrap();
        let table = DbfTable::open(&fixture(&dir), OpenMode::ReadOnly).unwrap();

        assert_eq!(table.name(), "mgw10000.dbf");
        assert_eq!(table.record_count(), 2);
        assert_eq!(table.max_length("crutaent01"), Some(40));
        assert_eq!(table.get(0, "CRUTAENT01").unwrap(), r"C:\Compacw\Empresas\Co1\xml");
        assert_eq!(table.get(0, "CRUTAPLA01").unwrap(), "corta");
        assert_eq!(table.get(1, "CRUTAENT01").unwrap(), "");
        assert!(!table.is_deleted(0));
    }

    #[test]
    fn test_writes_persist_after_close() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);

        let mut table = DbfTable::open(&path, OpenMode::ReadWrite).unwrap();
        table.set(1, "CRUTAENT01", r"\\SRV\Empresas\Co2").unwrap();
        assert!(table.has_pending_writes());
        table.close().unwrap();
        assert!(!table.has_pending_writes());

        let reopened = DbfTable::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(reopened.get(1, "CRUTAENT01").unwrap(), r"\\SRV\Empresas\Co2");
        assert_eq!(reopened.get(0, "CRUTAENT01").unwrap(), r"C:\Compacw\Empresas\Co1\xml");
        assert_eq!(reopened.get(1, "CIDEMPRESA").unwrap(), "   2");
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);

        {
            let mut table = DbfTable::open(&path, OpenMode::ReadWrite).unwrap();
            table.set(0, "CRUTAPLA01", "nueva").unwrap();
        }

        let reopened = DbfTable::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(reopened.get(0, "CRUTAPLA01").unwrap(), "nueva");
    }

    #[test]
    fn test_file_size_unchanged_by_writes() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);
        let before = std::fs::metadata(&path).unwrap().len();

        let mut table = DbfTable::open(&path, OpenMode::ReadWrite).unwrap();
        table.set(0, "CRUTAENT01", "x").unwrap();
        table.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn test_overflow_rejected() {
        let dir = TempDir::new().unwrap();
        let mut table = DbfTable::open(&fixture(&dir), OpenMode::ReadWrite).unwrap();
        let err = table.set(0, "CRUTAPLA01", "mucho mas de doce").unwrap_err();
        assert!(matches!(err, MigrateError::Overflow { max_length: 12, .. }));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let mut table = DbfTable::open(&fixture(&dir), OpenMode::ReadOnly).unwrap();
        let err = table.set(0, "CRUTAPLA01", "x").unwrap_err();
        assert!(matches!(err, MigrateError::WriteFailure { .. }));
    }

    #[test]
    fn test_numeric_field_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let mut table = DbfTable::open(&fixture(&dir), OpenMode::ReadWrite).unwrap();
        let err = table.set(0, "CIDEMPRESA", "9").unwrap_err();
        assert!(matches!(err, MigrateError::WriteFailure { .. }));
    }

    #[test]
    fn test_unencodable_character_rejected() {
        let dir = TempDir::new().unwrap();
        let mut table = DbfTable::open(&fixture(&dir), OpenMode::ReadWrite).unwrap();
        let err = table.set(0, "CRUTAPLA01", "ruta→x").unwrap_err();
        assert!(matches!(err, MigrateError::WriteFailure { .. }));
    }

    #[test]
    fn test_latin1_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir);

        let mut table = DbfTable::open(&path, OpenMode::ReadWrite).unwrap();
        table.set(0, "CRUTAPLA01", "Compañía").unwrap();
        table.close().unwrap();

        let reopened = DbfTable::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(reopened.get(0, "CRUTAPLA01").unwrap(), "Compañía");
    }

    #[test]
    fn test_unknown_column_and_record() {
        let dir = TempDir::new().unwrap();
        let table = DbfTable::open(&fixture(&dir), OpenMode::ReadOnly).unwrap();
        assert!(matches!(
            table.get(0, "NOPE").unwrap_err(),
            MigrateError::UnknownColumn { .. }
        ));
        assert!(matches!(
            table.get(9, "CRUTAENT01").unwrap_err(),
            MigrateError::Unexpected { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = DbfTable::open(&dir.path().join("mgw10006.dbf"), OpenMode::ReadWrite)
            .err()
            .unwrap();
        assert!(matches!(err, MigrateError::NotFound(_)));
    }

    #[test]
    fn test_corrupt_file_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mgw10006.dbf");
        std::fs::write(&path, b"not a table at all, just some text").unwrap();
        let err = DbfTable::open(&path, OpenMode::ReadWrite).err().unwrap();
        assert!(matches!(err, MigrateError::Format { .. }));
    }

    #[test]
    fn test_close_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut table = DbfTable::open(&fixture(&dir), OpenMode::ReadWrite).unwrap();
        table.close().unwrap();
        table.close().unwrap();
        assert!(table.set(0, "CRUTAPLA01", "x").is_err());
    }
}
