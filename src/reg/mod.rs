// Structures defining the hive file format
// see: https://github.com/msuhanov/regf/blob/master/Windows%20registry%20file%20format%20specification.md
//
// a visualisation of the REGF format
//
// +--------------------+------------------------------+
// |     Base block     |        Hive bins data        |
// +--------------------+------------------------------+
//                                    |
//                                    v
//             +-----------+  +-----------+  +-----------+      +-----------+
//             |  Hive bin |  |  Hive bin |  |  Hive bin |  ... |  Hive bin |
//             +-----------+  +-----------+  +-----------+      +-----------+
//
// The base block is validated once, the root key is found by scanning cells from the
// first hive bin, and the tree below it is expanded on demand.
use bincode::Decode;

pub mod cell;
pub mod error;
pub mod header;
pub mod root;
pub mod source;
pub mod walk;

#[cfg(test)]
pub(crate) mod testing;

pub use cell::{HashEntry, KeyKind, KeyNode, ListKind, SubkeyList, translate};
pub use error::{HeaderFault, RegError, Result};
pub use header::{BlockHeader, Filetime, HiveHeader, HiveVersion, validate};
pub use root::{Cell, CellScanner, RootLocator};
pub use source::{ByteSource, HiveFile};
pub use walk::{Children, KeyTree, TreeWalker, Walk, WalkOptions};

/// Size of the base block; stored offsets are relative to its end.
pub const BASE_BLOCK_SIZE: u64 = 0x1000;

/// Width of the signed size field in front of every cell.
pub const CELL_SIZE_WIDTH: u64 = 4;

/// Largest payload accepted while scanning for the root.
pub const MAX_CELL_SIZE: i64 = 0x1000;

// fixed-layout records are little-endian with no length prefixes
pub(crate) fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T> {
    let config = bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding();
    let (value, _) = bincode::decode_from_slice(bytes, config)?;
    Ok(value)
}
