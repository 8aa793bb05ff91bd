//! dBase III / FoxPro table header codec.
//!
//! Layout (little-endian):
//!
//! ```text
//! 0      version byte
//! 1..4   last update, YY MM DD (YY = years since 1900)
//! 4..8   record count (u32)
//! 8..10  header length in bytes (u16)
//! 10..12 record length in bytes, including the deletion flag (u16)
//! 12..32 reserved
//! 32..   32-byte field descriptors, terminated by 0x0D
//! ```
//!
//! Each descriptor holds an 11-byte NUL-padded name, the type letter, a
//! 4-byte displacement (FoxPro only), the length byte and the decimal count.
//! Character fields wider than 255 store the high byte of the width in the
//! decimal count.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDate};

use crate::core::{FieldKind, FieldSpec};
use crate::error::{MigrateError, Result};

/// Size of the fixed part of the header.
pub const HEADER_PREFIX_LEN: usize = 32;

/// Size of one field descriptor.
pub const DESCRIPTOR_LEN: usize = 32;

/// Byte that ends the descriptor array.
pub const HEADER_TERMINATOR: u8 = 0x0D;

/// Byte written after the last record.
pub const EOF_MARKER: u8 = 0x1A;

/// Version byte used for new tables (dBase III without memo).
pub const DBASE3_VERSION: u8 = 0x03;

/// Maximum field name length.
pub const MAX_NAME_LEN: usize = 10;

const NAME_FIELD_LEN: usize = 11;

/// A field and its byte offset inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub spec: FieldSpec,
    /// Offset from the start of the record (the deletion flag is byte 0).
    pub offset: usize,
}

/// Parsed table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub last_update: Option<NaiveDate>,
    pub record_count: usize,
    pub header_len: usize,
    pub record_len: usize,
    pub fields: Vec<FieldLayout>,
}

impl Header {
    /// Build a header for a new table.
    pub fn new(fields: &[FieldSpec], record_count: usize, today: NaiveDate) -> Result<Self> {
        if fields.is_empty() {
            return Err(MigrateError::Config("a table needs at least one field".into()));
        }

        let mut layouts = Vec::with_capacity(fields.len());
        let mut offset = 1;
        for spec in fields {
            if spec.name.is_empty() || spec.name.len() > MAX_NAME_LEN || !spec.name.is_ascii() {
                return Err(MigrateError::Config(format!(
                    "field name '{}' must be 1-{} ASCII characters",
                    spec.name, MAX_NAME_LEN
                )));
            }
            let limit = if spec.kind == FieldKind::Character { u16::MAX as usize } else { 255 };
            if spec.max_length == 0 || spec.max_length > limit {
                return Err(MigrateError::Config(format!(
                    "field '{}' width {} is out of range",
                    spec.name, spec.max_length
                )));
            }
            layouts.push(FieldLayout {
                spec: spec.clone(),
                offset,
            });
            offset += spec.max_length;
        }

        let header_len = HEADER_PREFIX_LEN + DESCRIPTOR_LEN * fields.len() + 1;
        if offset > u16::MAX as usize || header_len > u16::MAX as usize {
            return Err(MigrateError::Config("record layout too large".into()));
        }

        Ok(Self {
            version: DBASE3_VERSION,
            last_update: Some(today),
            record_count,
            header_len,
            record_len: offset,
            fields: layouts,
        })
    }

    /// Parse the header at the start of `bytes`.
    ///
    /// `table` is only used in error messages. Besides the header itself this
    /// checks that `bytes` is long enough to hold every declared record.
    pub fn parse(table: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_PREFIX_LEN + 1 {
            return Err(MigrateError::format(
                table,
                format!("file is {} bytes, too short for a table header", bytes.len()),
            ));
        }

        let mut buf = &bytes[..HEADER_PREFIX_LEN];
        let version = buf.get_u8();
        let (yy, mm, dd) = (buf.get_u8(), buf.get_u8(), buf.get_u8());
        let record_count = buf.get_u32_le() as usize;
        let header_len = buf.get_u16_le() as usize;
        let record_len = buf.get_u16_le() as usize;

        if header_len < HEADER_PREFIX_LEN + 1 || header_len > bytes.len() {
            return Err(MigrateError::format(
                table,
                format!(
                    "header length {} is invalid for a {}-byte file",
                    header_len,
                    bytes.len()
                ),
            ));
        }

        let mut fields = Vec::new();
        let mut offset = 1;
        let mut pos = HEADER_PREFIX_LEN;
        while pos < header_len && bytes[pos] != HEADER_TERMINATOR {
            if pos + DESCRIPTOR_LEN > header_len {
                return Err(MigrateError::format(
                    table,
                    format!("field descriptor at byte {} runs past the header", pos),
                ));
            }

            let mut desc = &bytes[pos..pos + DESCRIPTOR_LEN];
            let name = decode_name(&desc[..NAME_FIELD_LEN]);
            desc.advance(NAME_FIELD_LEN);
            let kind = FieldKind::from_code(desc.get_u8());
            desc.advance(4);
            let mut width = desc.get_u8() as usize;
            let decimals = desc.get_u8() as usize;
            if kind == FieldKind::Character {
                width |= decimals << 8;
            }

            if name.is_empty() {
                return Err(MigrateError::format(
                    table,
                    format!("field descriptor at byte {} has no name", pos),
                ));
            }

            fields.push(FieldLayout {
                spec: FieldSpec::new(name, kind, width),
                offset,
            });
            offset += width;
            pos += DESCRIPTOR_LEN;
        }

        if fields.is_empty() {
            return Err(MigrateError::format(table, "header declares no fields"));
        }
        if offset != record_len {
            return Err(MigrateError::format(
                table,
                format!(
                    "record length {} does not match field widths ({})",
                    record_len, offset
                ),
            ));
        }

        let needed = header_len + record_len * record_count;
        if bytes.len() < needed {
            return Err(MigrateError::format(
                table,
                format!(
                    "file is truncated: {} records need {} bytes, found {}",
                    record_count,
                    needed,
                    bytes.len()
                ),
            ));
        }

        Ok(Self {
            version,
            last_update: NaiveDate::from_ymd_opt(1900 + yy as i32, mm as u32, dd as u32),
            record_count,
            header_len,
            record_len,
            fields,
        })
    }

    /// Encode the header, descriptors and terminator.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.header_len);
        buf.put_u8(self.version);
        buf.put_slice(&encode_date(self.last_update));
        buf.put_u32_le(self.record_count as u32);
        buf.put_u16_le(self.header_len as u16);
        buf.put_u16_le(self.record_len as u16);
        buf.put_bytes(0, 20);

        for layout in &self.fields {
            let mut name = [0u8; NAME_FIELD_LEN];
            let raw = layout.spec.name.as_bytes();
            name[..raw.len()].copy_from_slice(raw);
            buf.put_slice(&name);
            buf.put_u8(layout.spec.kind.code());
            buf.put_u32_le(0);
            buf.put_u8((layout.spec.max_length & 0xFF) as u8);
            let high = if layout.spec.kind == FieldKind::Character {
                (layout.spec.max_length >> 8) as u8
            } else {
                0
            };
            buf.put_u8(high);
            buf.put_bytes(0, 14);
        }

        buf.put_u8(HEADER_TERMINATOR);
        buf
    }

    /// Look up a field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields
            .iter()
            .find(|f| f.spec.name.eq_ignore_ascii_case(name))
    }
}

/// Encode a last-update date as YY MM DD.
pub fn encode_date(date: Option<NaiveDate>) -> [u8; 3] {
    match date {
        Some(d) => [
            (d.year() - 1900).clamp(0, 255) as u8,
            d.month() as u8,
            d.day() as u8,
        ],
        None => [0, 0, 0],
    }
}

fn decode_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}
