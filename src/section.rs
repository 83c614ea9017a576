//! Interface to the NCA filesystem section this RomFS lives in.
//!
//! Decryption and hash-tree verification belong to the section
//! implementation; this crate only selects which verification scheme
//! applies, based on the header layout it parsed.

use std::io;

/// Which hash-tree scheme protects the section's data blocks.
///
/// NCA0 sections carry a HierarchicalSha256 hash table; NCA2/NCA3 sections
/// carry a HierarchicalIntegrity (IVFC) tree. Exactly one applies to any
/// given RomFS, selected by its header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    HierarchicalSha256,
    HierarchicalIntegrity,
}

/// Byte-range access to the decrypted NCA filesystem section.
///
/// Offsets are relative to the start of the section, not the NCA. Both
/// methods must fill `buf` completely or return an error; a short read is
/// an error, never a partial success.
///
/// Implementations only need `&self`: the reader is shared by every
/// operation on a mounted [`RomFileSystem`](crate::RomFileSystem), which
/// never serializes access on its own.
pub trait SectionReader {
    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Read exactly `buf.len()` bytes at `offset`, verifying the covered
    /// data blocks against the section's hash tree.
    fn read_verified_at(&self, offset: u64, buf: &mut [u8], integrity: IntegrityKind)
        -> io::Result<()>;
}

impl<T: SectionReader + ?Sized> SectionReader for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn read_verified_at(
        &self,
        offset: u64,
        buf: &mut [u8],
        integrity: IntegrityKind,
    ) -> io::Result<()> {
        (**self).read_verified_at(offset, buf, integrity)
    }
}
