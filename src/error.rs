use thiserror::Error;

#[derive(Debug, Error)]
pub enum RomfsError {
    /// The image metadata does not describe a valid RomFS.
    #[error("invalid RomFS image: {0}")]
    Format(String),

    /// An offset or offset+length exceeds its owning table or region.
    #[error("offset {offset:#x} + {len:#x} exceeds bound {limit:#x}")]
    Bounds { offset: u64, len: u64, limit: u64 },

    /// A payload read range exceeds the file entry's declared size.
    #[error("read {offset:#x} + {len:#x} exceeds file size {size:#x}")]
    Range { offset: u64, len: u64, size: u64 },

    /// A delegated section read failed or returned short.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry offset could not be resolved mid-walk during size accounting.
    #[error("dangling {table} entry offset {offset:#x} during traversal")]
    Traversal { table: &'static str, offset: u32 },
}

pub type Result<T> = std::result::Result<T, RomfsError>;
