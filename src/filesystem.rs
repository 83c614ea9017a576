//! The mounted RomFS context: initialization, raw and payload reads, entry
//! resolution and size accounting.

use log::debug;

use crate::entry::{DirectoryEntry, FileEntry, DIR_ENTRY_SIZE, FILE_ENTRY_SIZE, VOID_ENTRY};
use crate::error::{Result, RomfsError};
use crate::header::{RomfsHeader, HEADER_SIZE};
use crate::section::{IntegrityKind, SectionReader};

#[derive(Debug, Clone, Copy)]
struct Region {
    offset: u64,
    size: u64,
}

/// A mounted RomFS image.
///
/// Owns the section reader and the two fully loaded entry tables; all entry
/// views borrow from those tables and cannot outlive the filesystem. Nothing
/// is mutated after [`RomFileSystem::new`] returns, so any number of reads
/// may run concurrently against one instance (given a thread-safe reader).
/// The table buffers are released together when the value is dropped.
pub struct RomFileSystem<R> {
    reader: R,
    region: Region,
    header: RomfsHeader,
    integrity: IntegrityKind,
    dir_table: Vec<u8>,
    file_table: Vec<u8>,
    body_offset: u64,
}

fn read_region<R: SectionReader>(
    reader: &R,
    region: &Region,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let end = offset.checked_add(len as u64).ok_or(RomfsError::Bounds {
        offset,
        len: len as u64,
        limit: region.size,
    })?;
    if end > region.size {
        return Err(RomfsError::Bounds {
            offset,
            len: len as u64,
            limit: region.size,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_at(region.offset + offset, &mut buf)?;
    Ok(buf)
}

/// Entry table offsets are u32 by format, so no table larger than that is
/// addressable at all.
fn table_len(size: u64, table: &'static str) -> Result<usize> {
    if size > u32::MAX as u64 {
        return Err(RomfsError::Format(format!(
            "{table} entry table size {size:#x} exceeds the offset range"
        )));
    }
    Ok(size as usize)
}

impl<R: SectionReader> RomFileSystem<R> {
    /// Mount the RomFS at `[region_offset, region_offset + region_size)`
    /// within the section: parse the header, then load both entry tables.
    ///
    /// Fails without observable side effects; on error nothing is retained.
    pub fn new(reader: R, region_offset: u64, region_size: u64) -> Result<RomFileSystem<R>> {
        let region = Region {
            offset: region_offset,
            size: region_size,
        };

        let header_bytes = read_region(&reader, &region, 0, HEADER_SIZE)?;
        let header = RomfsHeader::parse(&header_bytes)?;

        // An image always has at least a root directory; an empty file
        // table is legal.
        if header.dir_entry.size == 0 {
            return Err(RomfsError::Format(
                "directory entry table is empty".into(),
            ));
        }

        let dir_table = read_region(
            &reader,
            &region,
            header.dir_entry.offset,
            table_len(header.dir_entry.size, "directory")?,
        )?;
        let file_table = read_region(
            &reader,
            &region,
            header.file_entry.offset,
            table_len(header.file_entry.size, "file")?,
        )?;

        debug!(
            "mounted {:?} RomFS: dir table {:#x} bytes, file table {:#x} bytes, body at {:#x}",
            header.layout,
            dir_table.len(),
            file_table.len(),
            header.body_offset,
        );

        Ok(RomFileSystem {
            reader,
            region,
            integrity: header.layout.integrity(),
            body_offset: header.body_offset,
            header,
            dir_table,
            file_table,
        })
    }

    /// The parsed, normalized header.
    pub fn header(&self) -> &RomfsHeader {
        &self.header
    }

    /// Start of the payload body, relative to the RomFS region.
    pub fn body_offset(&self) -> u64 {
        self.body_offset
    }

    /// The hash-tree scheme payload reads are verified against.
    pub fn integrity(&self) -> IntegrityKind {
        self.integrity
    }

    /// Release the table buffers and give the section reader back.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read raw bytes at a RomFS-relative offset, without verification.
    ///
    /// Checks the range against the region only; use
    /// [`Self::read_file_data`] for reads inside a file entry.
    pub fn read_raw(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        read_region(&self.reader, &self.region, offset, len)
    }

    /// Read `[local_offset, local_offset + len)` of a file's payload,
    /// verified against the section's hash tree.
    ///
    /// A range past `entry.data_size` is rejected before any delegated read
    /// happens.
    pub fn read_file_data(
        &self,
        entry: &FileEntry<'_>,
        local_offset: u64,
        len: usize,
    ) -> Result<Vec<u8>> {
        let local_end = local_offset.checked_add(len as u64).ok_or(RomfsError::Range {
            offset: local_offset,
            len: len as u64,
            size: entry.data_size,
        })?;
        if local_end > entry.data_size {
            return Err(RomfsError::Range {
                offset: local_offset,
                len: len as u64,
                size: entry.data_size,
            });
        }

        let offset = self
            .body_offset
            .checked_add(entry.data_offset)
            .and_then(|o| o.checked_add(local_offset))
            .and_then(|o| o.checked_add(len as u64).map(|end| (o, end)))
            .filter(|&(_, end)| end <= self.region.size)
            .map(|(o, _)| o)
            .ok_or_else(|| RomfsError::Bounds {
                // Report where in the region the read would have landed.
                offset: self
                    .body_offset
                    .saturating_add(entry.data_offset)
                    .saturating_add(local_offset),
                len: len as u64,
                limit: self.region.size,
            })?;

        let mut buf = vec![0u8; len];
        self.reader
            .read_verified_at(self.region.offset + offset, &mut buf, self.integrity)?;
        Ok(buf)
    }

    /// Resolve a directory-entry table offset, `None` when the fixed record
    /// would read past the table end (which also covers [`VOID_ENTRY`]).
    pub fn resolve_directory(&self, offset: u32) -> Option<DirectoryEntry<'_>> {
        DirectoryEntry::parse(&self.dir_table, offset)
    }

    /// Resolve a file-entry table offset, `None` when the fixed record
    /// would read past the table end (which also covers [`VOID_ENTRY`]).
    pub fn resolve_file(&self, offset: u32) -> Option<FileEntry<'_>> {
        FileEntry::parse(&self.file_table, offset)
    }

    /// The root directory, conventionally the entry at offset 0.
    pub fn root_directory(&self) -> Option<DirectoryEntry<'_>> {
        self.resolve_directory(0)
    }

    /// Iterate `dir`'s child directories along the sibling chain.
    pub fn child_directories<'a>(&'a self, dir: &DirectoryEntry<'a>) -> DirectoryChain<'a> {
        DirectoryChain {
            table: &self.dir_table,
            next: dir.directory_offset,
        }
    }

    /// Iterate `dir`'s child files along the sibling chain.
    pub fn child_files<'a>(&'a self, dir: &DirectoryEntry<'a>) -> FileChain<'a> {
        FileChain {
            table: &self.file_table,
            next: dir.file_offset,
        }
    }

    /// Total extracted size of the whole image: the sum of every file
    /// entry's `data_size`, walking the file table record by record.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut offset = 0u64;
        while offset < self.file_table.len() as u64 {
            // Table len fits u32 (checked at mount), so the cast is exact.
            let entry = self
                .resolve_file(offset as u32)
                .ok_or(RomfsError::Traversal {
                    table: "file",
                    offset: offset as u32,
                })?;
            // Validates name_length, which the stride depends on.
            entry.name_bytes()?;
            total = checked_sum(total, entry.data_size)?;
            offset += entry.stride();
        }
        Ok(total)
    }

    /// Total extracted size of the subtree rooted at `dir_entry_offset`:
    /// the sum of `data_size` over every file reachable through child/
    /// sibling chains.
    ///
    /// Any dangling offset along the way aborts with
    /// [`RomfsError::Traversal`] rather than reporting an undercount. Visit
    /// budgets derived from the table sizes bound the walk, so a cyclic
    /// chain in a malformed image fails instead of looping forever.
    pub fn directory_size(&self, dir_entry_offset: u32) -> Result<u64> {
        // One visit per distinct entry the tables could hold, charged when a
        // chain link is followed; exceeding it means the chains revisit
        // entries (a cycle).
        let mut dir_budget = self.dir_table.len() / DIR_ENTRY_SIZE;
        let mut file_budget = self.file_table.len() / FILE_ENTRY_SIZE;

        let mut total = 0u64;
        let mut pending = vec![dir_entry_offset];
        while let Some(offset) = pending.pop() {
            let dir = self
                .resolve_directory(offset)
                .ok_or(RomfsError::Traversal {
                    table: "directory",
                    offset,
                })?;

            for file in self.child_files(&dir) {
                let file = file?;
                if file_budget == 0 {
                    return Err(RomfsError::Traversal {
                        table: "file",
                        offset: file.entry_offset(),
                    });
                }
                file_budget -= 1;
                total = checked_sum(total, file.data_size)?;
            }

            for child in self.child_directories(&dir) {
                let child = child?;
                if dir_budget == 0 {
                    return Err(RomfsError::Traversal {
                        table: "directory",
                        offset: child.entry_offset(),
                    });
                }
                dir_budget -= 1;
                pending.push(child.entry_offset());
            }
        }
        Ok(total)
    }
}

// Written by hand so the reader type stays unconstrained.
impl<R> std::fmt::Debug for RomFileSystem<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomFileSystem")
            .field("region", &self.region)
            .field("layout", &self.header.layout)
            .field("integrity", &self.integrity)
            .field("dir_table_len", &self.dir_table.len())
            .field("file_table_len", &self.file_table.len())
            .field("body_offset", &self.body_offset)
            .finish()
    }
}

fn checked_sum(total: u64, size: u64) -> Result<u64> {
    total
        .checked_add(size)
        .ok_or_else(|| RomfsError::Format("file sizes overflow u64".into()))
}

/// Iterator over a sibling chain of directory entries.
///
/// Yields `Err(Traversal)` once and ends if a link points outside the
/// table; ends normally at [`VOID_ENTRY`].
pub struct DirectoryChain<'a> {
    table: &'a [u8],
    next: u32,
}

impl<'a> Iterator for DirectoryChain<'a> {
    type Item = Result<DirectoryEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == VOID_ENTRY {
            return None;
        }
        let offset = self.next;
        match DirectoryEntry::parse(self.table, offset) {
            Some(entry) => {
                self.next = entry.next_offset;
                Some(Ok(entry))
            }
            None => {
                self.next = VOID_ENTRY;
                Some(Err(RomfsError::Traversal {
                    table: "directory",
                    offset,
                }))
            }
        }
    }
}

/// Iterator over a sibling chain of file entries.
pub struct FileChain<'a> {
    table: &'a [u8],
    next: u32,
}

impl<'a> Iterator for FileChain<'a> {
    type Item = Result<FileEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == VOID_ENTRY {
            return None;
        }
        let offset = self.next;
        match FileEntry::parse(self.table, offset) {
            Some(entry) => {
                self.next = entry.next_offset;
                Some(Ok(entry))
            }
            None => {
                self.next = VOID_ENTRY;
                Some(Err(RomfsError::Traversal {
                    table: "file",
                    offset,
                }))
            }
        }
    }
}
