//! Archive header: signature, entry count and the entry directory.
//!
//! ```text
//! "HAF"            3 B
//! entry_count      u32
//! entry_count × {
//!     name_len     u16
//!     name         name_len B, UTF-8, no terminator
//!     original     u64
//!     encoded      u64
//!     offset       u64
//! }
//! ```
//!
//! All integers are little-endian.  The payload region starts right after
//! the last record, so the header length (and with it every offset) changes
//! whenever entries are added, removed or renamed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;

pub const MAGIC: &[u8; 3] = b"HAF";
/// Signature + entry count.
pub const PREAMBLE_SIZE: u64 = 3 + 4;
/// Fixed part of one record: name length + three u64 fields.
pub const RECORD_FIXED_SIZE: u64 = 2 + 8 + 8 + 8;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid archive signature")]
    InvalidMagic,
    #[error("Archive header is truncated")]
    Truncated,
    #[error("Entry count {count} does not fit in a {file_len}-byte archive")]
    ImplausibleCount { count: u32, file_len: u64 },
    #[error("Entry {index}: name length {len} exceeds the remaining header bytes")]
    ImplausibleName { index: u32, len: u16 },
    #[error("Entry {index}: name is not valid UTF-8")]
    InvalidName { index: u32 },
    #[error("Entry '{name}': data range {offset}+{encoded_size} lies outside the payload region")]
    EntryOutOfRange { name: String, offset: u64, encoded_size: u64 },
    #[error("Entry name '{0}' is longer than {max} bytes", max = u16::MAX)]
    NameTooLong(String),
    #[error("Entry name contains a NUL byte: {0:?}")]
    NulInName(String),
    #[error("Payload is not laid out back to back ({expected_len} B expected, file is {file_len} B)")]
    NonContiguous { expected_len: u64, file_len: u64 },
    #[error("Too many entries: {0}")]
    TooManyEntries(usize),
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for HeaderError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => HeaderError::Truncated,
            _ => HeaderError::Io(e),
        }
    }
}

// ── FileEntry ────────────────────────────────────────────────────────────────

/// Directory record for one packed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name:          String,
    pub original_size: u64,
    pub encoded_size:  u64,
    pub offset:        u64,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, original_size: u64, encoded_size: u64) -> Self {
        Self { name: name.into(), original_size, encoded_size, offset: 0 }
    }

    fn record_size(&self) -> u64 {
        RECORD_FIXED_SIZE + self.name.len() as u64
    }
}

/// Serialized length of a header holding `entries`.
pub fn header_size(entries: &[FileEntry]) -> u64 {
    PREAMBLE_SIZE + entries.iter().map(FileEntry::record_size).sum::<u64>()
}

/// Lay entries out back to back right after the header.  Returns the header
/// size the offsets were computed against.
pub fn assign_offsets(entries: &mut [FileEntry]) -> u64 {
    let header_len = header_size(entries);
    let mut next = header_len;
    for entry in entries.iter_mut() {
        entry.offset = next;
        next += entry.encoded_size;
    }
    header_len
}

// ── Serialization ────────────────────────────────────────────────────────────

pub fn write_header<W: Write>(mut writer: W, entries: &[FileEntry]) -> Result<(), HeaderError> {
    let count = u32::try_from(entries.len())
        .map_err(|_| HeaderError::TooManyEntries(entries.len()))?;

    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(count)?;
    for entry in entries {
        if entry.name.as_bytes().contains(&0) {
            return Err(HeaderError::NulInName(entry.name.clone()));
        }
        let name_len = u16::try_from(entry.name.len())
            .map_err(|_| HeaderError::NameTooLong(entry.name.clone()))?;
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_all(entry.name.as_bytes())?;
        writer.write_u64::<LittleEndian>(entry.original_size)?;
        writer.write_u64::<LittleEndian>(entry.encoded_size)?;
        writer.write_u64::<LittleEndian>(entry.offset)?;
    }
    Ok(())
}

/// Read the entry directory of an archive that is `file_len` bytes long.
///
/// Every count and length is checked against the bytes that can still
/// follow before anything is allocated, and every entry's data range must
/// sit between the end of the header and `file_len`.
pub fn read_header<R: Read>(mut reader: R, file_len: u64) -> Result<Vec<FileEntry>, HeaderError> {
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(HeaderError::InvalidMagic);
    }

    let count = reader.read_u32::<LittleEndian>()?;
    let mut remaining = file_len.saturating_sub(PREAMBLE_SIZE);
    if count as u64 * RECORD_FIXED_SIZE > remaining {
        return Err(HeaderError::ImplausibleCount { count, file_len });
    }

    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count {
        let name_len = reader.read_u16::<LittleEndian>()?;
        let records_left = (count - index) as u64 * RECORD_FIXED_SIZE;
        if name_len as u64 + records_left > remaining {
            return Err(HeaderError::ImplausibleName { index, len: name_len });
        }
        remaining -= name_len as u64 + RECORD_FIXED_SIZE;

        let mut name = vec![0u8; name_len as usize];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| HeaderError::InvalidName { index })?;

        entries.push(FileEntry {
            name,
            original_size: reader.read_u64::<LittleEndian>()?,
            encoded_size:  reader.read_u64::<LittleEndian>()?,
            offset:        reader.read_u64::<LittleEndian>()?,
        });
    }

    let header_len = header_size(&entries);
    for e in &entries {
        let end = e.offset.checked_add(e.encoded_size);
        if e.offset < header_len || end.map_or(true, |end| end > file_len) {
            return Err(HeaderError::EntryOutOfRange {
                name:         e.name.clone(),
                offset:       e.offset,
                encoded_size: e.encoded_size,
            });
        }
    }

    Ok(entries)
}
