//! RomFS header parsing.
//!
//! Two layouts exist in the wild: NCA0 sections use a 0x28-byte header with
//! u32 fields, NCA2/NCA3 sections a 0x50-byte header with u64 fields. Both
//! carry the same ten values; parsing normalizes them into a single
//! u64-wide shape so everything downstream is layout-agnostic.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, RomfsError};
use crate::section::IntegrityKind;

/// Size of the NCA0 header layout.
pub const OLD_HEADER_SIZE: usize = 0x28;

/// Size of the NCA2/NCA3 header layout, and the number of bytes read from
/// the start of the region to parse either layout.
pub const HEADER_SIZE: usize = 0x50;

/// Which header layout the image was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// Legacy 0x28-byte layout (NCA0 sections).
    Nca0,
    /// Current 0x50-byte layout (NCA2/NCA3 sections).
    Nca3,
}

impl HeaderLayout {
    /// The hash-tree scheme protecting sections of this layout.
    pub fn integrity(self) -> IntegrityKind {
        match self {
            HeaderLayout::Nca0 => IntegrityKind::HierarchicalSha256,
            HeaderLayout::Nca3 => IntegrityKind::HierarchicalIntegrity,
        }
    }
}

/// Offset and size of one of the four lookup/entry tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpan {
    pub offset: u64,
    pub size: u64,
}

/// Normalized RomFS header. All offsets are relative to the start of the
/// RomFS region regardless of the source layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomfsHeader {
    pub layout: HeaderLayout,
    pub dir_bucket: TableSpan,
    pub dir_entry: TableSpan,
    pub file_bucket: TableSpan,
    pub file_entry: TableSpan,
    pub body_offset: u64,
}

impl RomfsHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of the region.
    ///
    /// The leading header-size field is the layout tag: `0x28` as a u32
    /// selects the NCA0 layout, `0x50` as a u64 the NCA2/NCA3 layout. Any
    /// other value is rejected.
    pub fn parse(data: &[u8]) -> Result<RomfsHeader> {
        if data.len() < HEADER_SIZE {
            return Err(RomfsError::Format(format!(
                "header needs {HEADER_SIZE:#x} bytes, got {:#x}",
                data.len()
            )));
        }

        let mut r = data;
        let lead32 = r.read_u32::<LittleEndian>()?;
        if lead32 as usize == OLD_HEADER_SIZE {
            let mut fields = [0u64; 9];
            for field in &mut fields {
                *field = r.read_u32::<LittleEndian>()? as u64;
            }
            return Ok(RomfsHeader::from_fields(HeaderLayout::Nca0, fields));
        }

        let mut r = data;
        let lead64 = r.read_u64::<LittleEndian>()?;
        if lead64 == HEADER_SIZE as u64 {
            let mut fields = [0u64; 9];
            for field in &mut fields {
                *field = r.read_u64::<LittleEndian>()?;
            }
            return Ok(RomfsHeader::from_fields(HeaderLayout::Nca3, fields));
        }

        Err(RomfsError::Format(format!(
            "unknown header size field {lead64:#x}"
        )))
    }

    fn from_fields(layout: HeaderLayout, f: [u64; 9]) -> RomfsHeader {
        RomfsHeader {
            layout,
            dir_bucket: TableSpan { offset: f[0], size: f[1] },
            dir_entry: TableSpan { offset: f[2], size: f[3] },
            file_bucket: TableSpan { offset: f[4], size: f[5] },
            file_entry: TableSpan { offset: f[6], size: f[7] },
            body_offset: f[8],
        }
    }
}
