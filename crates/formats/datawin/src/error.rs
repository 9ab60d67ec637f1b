use thiserror::Error;

use crate::address::{ObjectId, TypeTag};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid magic: expected {expected:?}, found {found:?}")]
    InvalidMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("invalid chunk magic at offset {offset:#x}: {magic:?}")]
    InvalidChunkMagic { offset: usize, magic: [u8; 4] },

    #[error("chunk {} not found", String::from_utf8_lossy(.magic))]
    ChunkNotFound { magic: [u8; 4] },

    #[error("string at offset {offset:#x} is not valid UTF-8: {source}")]
    InvalidString {
        offset: usize,
        source: std::string::FromUtf8Error,
    },

    #[error("unsupported bytecode version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("{context}: {message}")]
    Parse { context: &'static str, message: String },

    /// A read ran past the end of the section being decoded.
    #[error(
        "read past end of chunk {} at offset {offset:#x} (need {need} bytes, have {have})",
        String::from_utf8_lossy(.magic)
    )]
    SectionOverrun {
        magic: [u8; 4],
        offset: usize,
        need: usize,
        have: usize,
    },

    /// A pointer (or a registration) disagrees with what the tracker knows
    /// about that offset.
    #[error("corrupt pointer {offset:#x}: {message}")]
    CorruptPointer { offset: u32, message: String },

    /// A pointer target never materialized during the pass.
    #[error("pointer at {source_offset:#x} to {target:#x} ({kind}) was never resolved")]
    UnresolvedPointer {
        source_offset: u32,
        target: u32,
        kind: TypeTag,
    },

    /// A field that must hold a fixed sentinel holds something else.
    #[error("{field} at offset {offset:#x}: expected {expected}, found {found}")]
    FormatInvariant {
        offset: usize,
        field: &'static str,
        expected: i32,
        found: i32,
    },

    #[error("{what} at offset {offset:#x} declares {declared} elements but {actual} were read")]
    CountMismatch {
        offset: usize,
        what: &'static str,
        declared: u32,
        actual: u32,
    },

    #[error(
        "reference chain of {target} declares {declared} occurrences but {walked} links were found"
    )]
    ChainLengthMismatch {
        target: ObjectId,
        declared: u32,
        walked: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
