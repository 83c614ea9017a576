//! Developer-facing utilities for building synthetic RomFS images.
//!
//! This is intentionally a module (not a `tests/`-only helper) so it can be
//! reused from unit tests, integration tests and downstream crates that
//! need a well-formed image to exercise their own extraction logic.

use std::cell::Cell;
use std::io;

use crate::entry::{DIR_ENTRY_SIZE, FILE_ENTRY_SIZE, VOID_ENTRY};
use crate::header::{HeaderLayout, HEADER_SIZE, OLD_HEADER_SIZE};
use crate::section::{IntegrityKind, SectionReader};

/// An in-memory [`SectionReader`] that counts delegated reads, so tests can
/// assert that a rejected operation performed none.
pub struct MemorySection {
    data: Vec<u8>,
    reads: Cell<usize>,
    verified_reads: Cell<usize>,
    last_integrity: Cell<Option<IntegrityKind>>,
}

impl MemorySection {
    pub fn new(data: Vec<u8>) -> MemorySection {
        MemorySection {
            data,
            reads: Cell::new(0),
            verified_reads: Cell::new(0),
            last_integrity: Cell::new(None),
        }
    }

    /// Total number of delegated reads, plain and verified.
    pub fn reads(&self) -> usize {
        self.reads.get() + self.verified_reads.get()
    }

    /// Number of delegated verified reads only.
    pub fn verified_reads(&self) -> usize {
        self.verified_reads.get()
    }

    /// The scheme passed to the most recent verified read, if any.
    pub fn last_integrity(&self) -> Option<IntegrityKind> {
        self.last_integrity.get()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn copy_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of section")
            })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

impl SectionReader for MemorySection {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.reads.set(self.reads.get() + 1);
        self.copy_at(offset, buf)
    }

    fn read_verified_at(
        &self,
        offset: u64,
        buf: &mut [u8],
        integrity: IntegrityKind,
    ) -> io::Result<()> {
        self.verified_reads.set(self.verified_reads.get() + 1);
        self.last_integrity.set(Some(integrity));
        self.copy_at(offset, buf)
    }
}

/// Handle to a directory added to a [`RomfsBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirHandle(usize);

struct DirSpec {
    name: Vec<u8>,
    parent: usize,
    child_dirs: Vec<usize>,
    child_files: Vec<usize>,
}

struct FileSpec {
    name: Vec<u8>,
    data: Vec<u8>,
}

/// Builds well-formed RomFS images in memory, in either header layout.
///
/// Directories and files serialize in insertion order; sibling chains follow
/// insertion order within a parent. The root directory (empty name, its own
/// parent) always exists.
pub struct RomfsBuilder {
    layout: HeaderLayout,
    dirs: Vec<DirSpec>,
    files: Vec<FileSpec>,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

impl RomfsBuilder {
    /// A builder for the current (NCA2/NCA3) layout.
    pub fn new() -> RomfsBuilder {
        RomfsBuilder::with_layout(HeaderLayout::Nca3)
    }

    /// A builder for the legacy (NCA0) layout.
    pub fn legacy() -> RomfsBuilder {
        RomfsBuilder::with_layout(HeaderLayout::Nca0)
    }

    fn with_layout(layout: HeaderLayout) -> RomfsBuilder {
        RomfsBuilder {
            layout,
            dirs: vec![DirSpec {
                name: Vec::new(),
                parent: 0,
                child_dirs: Vec::new(),
                child_files: Vec::new(),
            }],
            files: Vec::new(),
        }
    }

    pub fn root(&self) -> DirHandle {
        DirHandle(0)
    }

    pub fn add_directory(&mut self, parent: DirHandle, name: &str) -> DirHandle {
        let index = self.dirs.len();
        self.dirs.push(DirSpec {
            name: name.as_bytes().to_vec(),
            parent: parent.0,
            child_dirs: Vec::new(),
            child_files: Vec::new(),
        });
        self.dirs[parent.0].child_dirs.push(index);
        DirHandle(index)
    }

    pub fn add_file(&mut self, parent: DirHandle, name: &str, data: &[u8]) {
        let index = self.files.len();
        self.files.push(FileSpec {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
        });
        self.dirs[parent.0].child_files.push(index);
    }

    /// The directory-entry table offset `dir` will serialize at.
    pub fn dir_entry_offset(&self, dir: DirHandle) -> u32 {
        self.dir_offsets()[dir.0]
    }

    fn dir_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.dirs.len());
        let mut offset = 0usize;
        for dir in &self.dirs {
            offsets.push(offset as u32);
            offset += align4(DIR_ENTRY_SIZE + dir.name.len());
        }
        offsets
    }

    fn file_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.files.len());
        let mut offset = 0usize;
        for file in &self.files {
            offsets.push(offset as u32);
            offset += align4(FILE_ENTRY_SIZE + file.name.len());
        }
        offsets
    }

    /// Serialize the image. The RomFS region starts at byte 0 of the
    /// returned buffer.
    pub fn build(&self) -> Vec<u8> {
        let dir_offsets = self.dir_offsets();
        let file_offsets = self.file_offsets();

        let header_size = match self.layout {
            HeaderLayout::Nca0 => OLD_HEADER_SIZE,
            HeaderLayout::Nca3 => HEADER_SIZE,
        };

        // Single dummy bucket per table; the reader never consumes them.
        let dir_bucket_size = 4;
        let file_bucket_size = 4;
        let dir_entry_size: usize = self
            .dirs
            .iter()
            .map(|d| align4(DIR_ENTRY_SIZE + d.name.len()))
            .sum();
        let file_entry_size: usize = self
            .files
            .iter()
            .map(|f| align4(FILE_ENTRY_SIZE + f.name.len()))
            .sum();

        let dir_bucket_offset = header_size;
        let dir_entry_offset = dir_bucket_offset + dir_bucket_size;
        let file_bucket_offset = dir_entry_offset + dir_entry_size;
        let file_entry_offset = file_bucket_offset + file_bucket_size;
        let body_offset = file_entry_offset + file_entry_size;

        let mut image = Vec::new();
        let fields = [
            header_size,
            dir_bucket_offset,
            dir_bucket_size,
            dir_entry_offset,
            dir_entry_size,
            file_bucket_offset,
            file_bucket_size,
            file_entry_offset,
            file_entry_size,
            body_offset,
        ];
        for field in fields {
            match self.layout {
                HeaderLayout::Nca0 => image.extend_from_slice(&(field as u32).to_le_bytes()),
                HeaderLayout::Nca3 => image.extend_from_slice(&(field as u64).to_le_bytes()),
            }
        }

        image.extend_from_slice(&VOID_ENTRY.to_le_bytes()); // dir bucket

        for (index, dir) in self.dirs.iter().enumerate() {
            let sibling = self.next_sibling(&self.dirs[dir.parent].child_dirs, index, &dir_offsets);
            let first_dir = dir
                .child_dirs
                .first()
                .map_or(VOID_ENTRY, |&d| dir_offsets[d]);
            let first_file = dir
                .child_files
                .first()
                .map_or(VOID_ENTRY, |&f| file_offsets[f]);
            for field in [
                dir_offsets[dir.parent],
                sibling,
                first_dir,
                first_file,
                0, // bucket offset
                dir.name.len() as u32,
            ] {
                image.extend_from_slice(&field.to_le_bytes());
            }
            image.extend_from_slice(&dir.name);
            while image.len() % 4 != 0 {
                image.push(0);
            }
        }

        image.extend_from_slice(&VOID_ENTRY.to_le_bytes()); // file bucket

        let mut data_offset = 0u64;
        let parent_of_file: Vec<usize> = {
            let mut parents = vec![0; self.files.len()];
            for (dir_index, dir) in self.dirs.iter().enumerate() {
                for &f in &dir.child_files {
                    parents[f] = dir_index;
                }
            }
            parents
        };
        for (index, file) in self.files.iter().enumerate() {
            let parent = parent_of_file[index];
            let sibling =
                self.next_sibling(&self.dirs[parent].child_files, index, &file_offsets);
            for field in [dir_offsets[parent], sibling] {
                image.extend_from_slice(&field.to_le_bytes());
            }
            image.extend_from_slice(&data_offset.to_le_bytes());
            image.extend_from_slice(&(file.data.len() as u64).to_le_bytes());
            for field in [0u32, file.name.len() as u32] {
                image.extend_from_slice(&field.to_le_bytes());
            }
            image.extend_from_slice(&file.name);
            while image.len() % 4 != 0 {
                image.push(0);
            }
            data_offset += file.data.len() as u64;
        }

        debug_assert_eq!(image.len(), body_offset);
        for file in &self.files {
            image.extend_from_slice(&file.data);
        }
        // The reader always fetches HEADER_SIZE bytes up front, so even a
        // bodyless NCA0 image must reach that far.
        if image.len() < HEADER_SIZE {
            image.resize(HEADER_SIZE, 0);
        }
        image
    }

    /// Serialize the image into a [`MemorySection`] with `region_offset`
    /// padding bytes in front, so tests exercise a nonzero region offset.
    pub fn build_section(&self, region_offset: usize) -> MemorySection {
        let mut data = vec![0u8; region_offset];
        data.extend_from_slice(&self.build());
        MemorySection::new(data)
    }

    fn next_sibling(&self, siblings: &[usize], index: usize, offsets: &[u32]) -> u32 {
        siblings
            .iter()
            .position(|&i| i == index)
            .and_then(|pos| siblings.get(pos + 1))
            .map_or(VOID_ENTRY, |&next| offsets[next])
    }
}

impl Default for RomfsBuilder {
    fn default() -> Self {
        RomfsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filesystem::RomFileSystem;

    #[test]
    fn built_image_mounts_in_both_layouts() {
        for builder in [RomfsBuilder::new(), RomfsBuilder::legacy()] {
            let section = builder.build_section(0);
            let fs = RomFileSystem::new(&section, 0, section.len() as u64).unwrap();
            let root = fs.root_directory().unwrap();
            assert_eq!(root.name_bytes().unwrap(), b"");
            assert_eq!(root.parent_offset, 0);
            assert_eq!(fs.total_size().unwrap(), 0);
        }
    }
}
