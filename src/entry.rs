//! Bounds-checked views over the loaded entry tables.
//!
//! Entries are variable-length records: a fixed header followed by a name of
//! `name_length` bytes, with the next record aligned to a 4-byte boundary.
//! Resolution only validates the fixed part — that is the hot navigation
//! path. The name tail is validated separately by [`DirectoryEntry::name_bytes`]
//! / [`FileEntry::name_bytes`], so an entry can resolve fine while its name
//! is still rejected as truncated.

use std::borrow::Cow;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, RomfsError};

/// Fixed-part size of a directory entry record.
pub const DIR_ENTRY_SIZE: usize = 0x18;

/// Fixed-part size of a file entry record.
pub const FILE_ENTRY_SIZE: usize = 0x20;

/// Sentinel offset marking the end of a sibling/child chain or an absent
/// table reference.
pub const VOID_ENTRY: u32 = 0xFFFF_FFFF;

fn align4(n: u64) -> u64 {
    (n + 3) & !3
}

fn name_slice(table: &[u8], entry_offset: u32, fixed: usize, name_length: u32) -> Result<&[u8]> {
    let start = entry_offset as usize + fixed;
    let end = start
        .checked_add(name_length as usize)
        .filter(|&end| end <= table.len())
        .ok_or(RomfsError::Bounds {
            offset: start as u64,
            len: name_length as u64,
            limit: table.len() as u64,
        })?;
    Ok(&table[start..end])
}

/// A directory record borrowed from the loaded directory-entry table.
///
/// All `*_offset` fields are offsets into the owning table of this entry's
/// kind ([`VOID_ENTRY`] meaning "none"), untrusted until resolved.
#[derive(Clone, Copy)]
pub struct DirectoryEntry<'a> {
    table: &'a [u8],
    entry_offset: u32,
    pub parent_offset: u32,
    pub next_offset: u32,
    pub directory_offset: u32,
    pub file_offset: u32,
    pub bucket_offset: u32,
    pub name_length: u32,
}

impl<'a> DirectoryEntry<'a> {
    /// Decode the fixed record at `offset`, or `None` if it would read past
    /// the end of the table. The name tail is not validated here.
    pub(crate) fn parse(table: &'a [u8], offset: u32) -> Option<DirectoryEntry<'a>> {
        let start = offset as usize;
        let end = start.checked_add(DIR_ENTRY_SIZE)?;
        if end > table.len() {
            return None;
        }
        let mut r = &table[start..end];
        Some(DirectoryEntry {
            table,
            entry_offset: offset,
            parent_offset: r.read_u32::<LittleEndian>().ok()?,
            next_offset: r.read_u32::<LittleEndian>().ok()?,
            directory_offset: r.read_u32::<LittleEndian>().ok()?,
            file_offset: r.read_u32::<LittleEndian>().ok()?,
            bucket_offset: r.read_u32::<LittleEndian>().ok()?,
            name_length: r.read_u32::<LittleEndian>().ok()?,
        })
    }

    /// Offset of this entry within the directory-entry table.
    pub fn entry_offset(&self) -> u32 {
        self.entry_offset
    }

    /// The raw name bytes, validated against the table bounds.
    pub fn name_bytes(&self) -> Result<&'a [u8]> {
        name_slice(self.table, self.entry_offset, DIR_ENTRY_SIZE, self.name_length)
    }

    /// The name decoded as UTF-8 (lossily; names are UTF-8 by format).
    pub fn name(&self) -> Result<Cow<'a, str>> {
        Ok(String::from_utf8_lossy(self.name_bytes()?))
    }
}

impl std::fmt::Debug for DirectoryEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryEntry")
            .field("entry_offset", &self.entry_offset)
            .field("parent_offset", &self.parent_offset)
            .field("next_offset", &self.next_offset)
            .field("directory_offset", &self.directory_offset)
            .field("file_offset", &self.file_offset)
            .field("name_length", &self.name_length)
            .finish()
    }
}

/// A file record borrowed from the loaded file-entry table.
///
/// `data_offset` and `data_size` are relative to the body, not to the table.
#[derive(Clone, Copy)]
pub struct FileEntry<'a> {
    table: &'a [u8],
    entry_offset: u32,
    pub parent_offset: u32,
    pub next_offset: u32,
    pub data_offset: u64,
    pub data_size: u64,
    pub bucket_offset: u32,
    pub name_length: u32,
}

impl<'a> FileEntry<'a> {
    /// Decode the fixed record at `offset`, or `None` if it would read past
    /// the end of the table. The name tail is not validated here.
    pub(crate) fn parse(table: &'a [u8], offset: u32) -> Option<FileEntry<'a>> {
        let start = offset as usize;
        let end = start.checked_add(FILE_ENTRY_SIZE)?;
        if end > table.len() {
            return None;
        }
        let mut r = &table[start..end];
        Some(FileEntry {
            table,
            entry_offset: offset,
            parent_offset: r.read_u32::<LittleEndian>().ok()?,
            next_offset: r.read_u32::<LittleEndian>().ok()?,
            data_offset: r.read_u64::<LittleEndian>().ok()?,
            data_size: r.read_u64::<LittleEndian>().ok()?,
            bucket_offset: r.read_u32::<LittleEndian>().ok()?,
            name_length: r.read_u32::<LittleEndian>().ok()?,
        })
    }

    /// Offset of this entry within the file-entry table.
    pub fn entry_offset(&self) -> u32 {
        self.entry_offset
    }

    /// The raw name bytes, validated against the table bounds.
    pub fn name_bytes(&self) -> Result<&'a [u8]> {
        name_slice(self.table, self.entry_offset, FILE_ENTRY_SIZE, self.name_length)
    }

    /// The name decoded as UTF-8 (lossily; names are UTF-8 by format).
    pub fn name(&self) -> Result<Cow<'a, str>> {
        Ok(String::from_utf8_lossy(self.name_bytes()?))
    }

    /// Distance from this record's start to the next record in the table,
    /// per the 4-byte alignment rule.
    pub(crate) fn stride(&self) -> u64 {
        align4(FILE_ENTRY_SIZE as u64 + self.name_length as u64)
    }
}

impl std::fmt::Debug for FileEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("entry_offset", &self.entry_offset)
            .field("parent_offset", &self.parent_offset)
            .field("next_offset", &self.next_offset)
            .field("data_offset", &self.data_offset)
            .field("data_size", &self.data_size)
            .field("name_length", &self.name_length)
            .finish()
    }
}
