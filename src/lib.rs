//! Read-only reader for RomFS filesystem sections embedded in NCA content
//! archives.
//!
//! A RomFS image packages a directory/file tree as two flat entry tables
//! (directories and files, linked by sibling/child offsets) plus a body of
//! raw payload bytes, all addressed by offsets relative to the start of the
//! image. This crate parses either of the two historical header layouts
//! (NCA0 and NCA2/NCA3), loads both entry tables into memory, and exposes
//! bounds-checked entry resolution, payload reads and subtree size
//! accounting on top of them.
//!
//! Every offset inside the image is treated as untrusted: entry resolution,
//! name access, payload reads and size accounting all validate their inputs
//! against the owning table or region before dereferencing anything.
//!
//! Decrypting and authenticating the surrounding NCA is not this crate's
//! job. You provide a [`SectionReader`] that reads (and optionally
//! hash-verifies) byte ranges of the NCA filesystem section; this crate only
//! decides *which* ranges to read.
//!
//! ```no_run
//! use nca_romfs::{RomFileSystem, SectionReader};
//!
//! fn dump_total<R: SectionReader>(section: R, offset: u64, size: u64) -> nca_romfs::Result<u64> {
//!     let fs = RomFileSystem::new(section, offset, size)?;
//!     fs.total_size()
//! }
//! ```

pub mod entry;
pub mod error;
pub mod filesystem;
pub mod header;
pub mod section;

/// Developer-facing utilities (kept as a module, not a binary).
pub mod test;

pub use entry::{DirectoryEntry, FileEntry, DIR_ENTRY_SIZE, FILE_ENTRY_SIZE, VOID_ENTRY};
pub use error::{Result, RomfsError};
pub use filesystem::{DirectoryChain, FileChain, RomFileSystem};
pub use header::{HeaderLayout, RomfsHeader, HEADER_SIZE, OLD_HEADER_SIZE};
pub use section::{IntegrityKind, SectionReader};
