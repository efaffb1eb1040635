use std::io;

use thiserror::Error;

/// Reasons a hive base block is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderFault {
    #[error("bad signature \"{}\"", .0.escape_ascii())]
    BadSignature([u8; 4]),

    #[error("bad checksum: stored {stored:#010x}, computed {computed:#010x}")]
    BadChecksum { stored: u32, computed: u32 },

    #[error("header is only {0} bytes long")]
    Short(usize),
}

/// Everything that can go wrong while decoding a hive.
///
/// Only [`RegError::SubkeyCountMismatch`] is recoverable: the walker logs it and keeps going.
#[derive(Debug, Error)]
pub enum RegError {
    #[error("invalid hive header: {0}")]
    InvalidHeader(HeaderFault),

    #[error("truncated read at {offset:#x}: needed {needed} bytes, got {got}")]
    TruncatedRead {
        offset: u64,
        needed: usize,
        got: usize,
    },

    #[error("malformed cell size {size} at {offset:#x}")]
    MalformedCellSize { offset: u64, size: i32 },

    #[error(
        "number of subkeys does not match for list at {offset:#x}: key declares {declared}, list holds {actual}"
    )]
    SubkeyCountMismatch {
        offset: u32,
        declared: i32,
        actual: usize,
    },

    #[error("unknown {} type \"{}\" at {offset:#x}", list_context(.nested), .signature.escape_ascii())]
    UnknownSubkeyEncoding {
        offset: u32,
        signature: [u8; 2],
        nested: bool,
    },

    #[error("negative entry count {count} in subkey list at {offset:#x}")]
    NegativeEntryCount { offset: u32, count: i16 },

    #[error("expected a key node at {offset:#x}, found \"{}\"", .found.escape_ascii())]
    NotAKeyNode { offset: u32, found: [u8; 2] },

    #[error("cell at {position:#x} lies outside the hive bins data")]
    CellOutOfRange { position: u64 },

    #[error("no root key found between {start:#x} and {end:#x}")]
    RootNotFound { start: u64, end: u64 },

    /// A key offset came up a second time during one walk, either through a loop or
    /// because two lists name the same key.
    #[error("key at {offset:#x} was reached twice")]
    CycleDetected { offset: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] bincode::error::DecodeError),
}

impl RegError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RegError::SubkeyCountMismatch { .. })
    }
}

fn list_context(nested: &bool) -> &'static str {
    if *nested { "ri subentry" } else { "subkey list" }
}

pub type Result<T> = std::result::Result<T, RegError>;
