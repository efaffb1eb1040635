// Cell records reachable from a key node.
//
// REGF Header
// └── Root Key (nk)
//     ├── Subkey list (lf, lh, ri, li)
//     │   ├── Subkey 1 (nk)
//     │   └── Subkey 2 (nk)
//     └── Values (vk), not decoded here
//
// Offsets stored in these records are relative to the first hive bin and point at the
// cell's size field, so the payload of a cell starts at `offset + 0x1000 + 4`.
use std::fmt;

use bincode::Decode;

use super::{
    BASE_BLOCK_SIZE, CELL_SIZE_WIDTH, decode,
    error::{RegError, Result},
    header::Filetime,
    source::ByteSource,
};

/// Length of the fixed part of a key node, up to and including the class name length.
pub const KEY_NODE_FIXED_SIZE: usize = 76;

const NK_SIGNATURE: &[u8; 2] = b"nk";

/// Absolute file position of the payload of the cell at relative `offset`.
pub const fn translate(offset: u32) -> u64 {
    offset as u64 + BASE_BLOCK_SIZE + CELL_SIZE_WIDTH
}

/// Type discriminant of a key node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Root,
    Node,
    Link,
    Other(u16),
}

impl From<u16> for KeyKind {
    fn from(value: u16) -> Self {
        match value {
            0x2C => KeyKind::Root,
            0x20 => KeyKind::Node,
            0x10 => KeyKind::Link,
            v => KeyKind::Other(v),
        }
    }
}

impl KeyKind {
    pub fn raw(self) -> u16 {
        match self {
            KeyKind::Root => 0x2C,
            KeyKind::Node => 0x20,
            KeyKind::Link => 0x10,
            KeyKind::Other(v) => v,
        }
    }
}

// on-disk layout of the fixed part of an nk cell
#[derive(Debug, Decode)]
struct KeyNodeHeader {
    signature: [u8; 2],
    kind: u16,
    modified: Filetime,
    _u1: u32,
    parent: u32,
    num_subkeys: i32,
    _u2: u32,
    subkeys: u32,
    _u3: u32,
    num_values: i32,
    values: u32,
    security: u32,
    class_name: u32,
    _reserved: [u32; 5],
    name_len: u16,
    class_name_len: u16,
}

/// A registry key (nk cell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNode {
    /// Relative offset of this cell, as stored in the lists that point to it.
    pub offset: u32,
    pub kind: KeyKind,
    pub modified: Filetime,
    pub parent: u32,
    pub num_subkeys: i32,
    pub subkeys: u32,
    pub num_values: i32,
    pub values: u32,
    pub security: u32,
    pub class_name: u32,
    pub class_name_len: u16,
    pub name: String,
}

impl KeyNode {
    /// Decodes a key node from its cell payload.
    ///
    /// `payload` must start at the "nk" signature and hold at least the fixed part plus the
    /// name.
    pub fn parse(offset: u32, payload: &[u8]) -> Result<Self> {
        let header = Self::parse_fixed(offset, payload)?;
        let needed = KEY_NODE_FIXED_SIZE + header.name_len as usize;
        if payload.len() < needed {
            return Err(RegError::TruncatedRead {
                offset: translate(offset),
                needed,
                got: payload.len(),
            });
        }

        // names of compressed keys are stored one byte per character
        let name = payload[KEY_NODE_FIXED_SIZE..needed]
            .iter()
            .map(|&b| b as char)
            .collect();

        Ok(Self {
            offset,
            kind: KeyKind::from(header.kind),
            modified: header.modified,
            parent: header.parent,
            num_subkeys: header.num_subkeys,
            subkeys: header.subkeys,
            num_values: header.num_values,
            values: header.values,
            security: header.security,
            class_name: header.class_name,
            class_name_len: header.class_name_len,
            name,
        })
    }

    /// Reads the key node whose cell sits at relative `offset`.
    ///
    /// The name length lives inside the record, so this takes two reads at the same
    /// position: the fixed part first, then the fixed part plus the name.
    pub fn read_at<S: ByteSource + ?Sized>(source: &mut S, offset: u32) -> Result<Self> {
        let pos = translate(offset);

        let fixed = source.read_exact_at(pos, KEY_NODE_FIXED_SIZE)?;
        let header = Self::parse_fixed(offset, &fixed)?;

        let full = source.read_exact_at(pos, KEY_NODE_FIXED_SIZE + header.name_len as usize)?;
        Self::parse(offset, &full)
    }

    fn parse_fixed(offset: u32, payload: &[u8]) -> Result<KeyNodeHeader> {
        if payload.len() < KEY_NODE_FIXED_SIZE {
            return Err(RegError::TruncatedRead {
                offset: translate(offset),
                needed: KEY_NODE_FIXED_SIZE,
                got: payload.len(),
            });
        }

        let header: KeyNodeHeader = decode(&payload[..KEY_NODE_FIXED_SIZE])?;
        if &header.signature != NK_SIGNATURE {
            return Err(RegError::NotAKeyNode {
                offset,
                found: header.signature,
            });
        }
        Ok(header)
    }

    pub fn is_root(&self) -> bool {
        self.kind == KeyKind::Root
    }

    /// True when the key declares no subkeys or has no usable subkey list offset.
    pub fn is_leaf(&self) -> bool {
        self.num_subkeys == 0 || self.subkeys == 0 || self.subkeys == u32::MAX
    }
}

impl fmt::Display for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nk: type {:#x} parent {:#x}, {} subkeys at {:#x}, {} values at {:#x}, security descriptor at {:#x}, name {}",
            self.kind.raw(),
            self.parent,
            self.num_subkeys,
            self.subkeys,
            self.num_values,
            self.values,
            self.security,
            self.name
        )
    }
}

/// Signature of a subkey list cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    FastLeaf,  // lf: offsets with the first 4 characters of each name
    HashLeaf,  // lh: offsets with a name hash
    IndexRoot, // ri: offsets of other subkey lists
    IndexLeaf, // li: plain offsets
}

impl ListKind {
    pub fn from_signature(sig: [u8; 2]) -> Option<Self> {
        match &sig {
            b"lf" => Some(ListKind::FastLeaf),
            b"lh" => Some(ListKind::HashLeaf),
            b"ri" => Some(ListKind::IndexRoot),
            b"li" => Some(ListKind::IndexLeaf),
            _ => None,
        }
    }

    pub fn signature(self) -> [u8; 2] {
        match self {
            ListKind::FastLeaf => *b"lf",
            ListKind::HashLeaf => *b"lh",
            ListKind::IndexRoot => *b"ri",
            ListKind::IndexLeaf => *b"li",
        }
    }

    fn entry_size(self) -> usize {
        match self {
            ListKind::FastLeaf | ListKind::HashLeaf => 8,
            ListKind::IndexRoot | ListKind::IndexLeaf => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    pub offset: u32,
    pub hash: [u8; 4],
}

/// A decoded subkey list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubkeyList {
    /// lf or lh: entries point at key nodes.
    Hash {
        kind: ListKind,
        entries: Vec<HashEntry>,
    },
    /// ri: entries point at other lists.
    Indirect(Vec<u32>),
    /// li: entries point at key nodes.
    Index(Vec<u32>),
}

impl SubkeyList {
    /// Reads the subkey list whose cell sits at relative `offset`.
    pub fn read_at<S: ByteSource + ?Sized>(source: &mut S, offset: u32) -> Result<Self> {
        let pos = translate(offset);

        let head = source.read_exact_at(pos, 4)?;
        let signature = [head[0], head[1]];
        let count = i16::from_le_bytes([head[2], head[3]]);

        let kind = ListKind::from_signature(signature).ok_or(RegError::UnknownSubkeyEncoding {
            offset,
            signature,
            nested: false,
        })?;
        if count < 0 {
            return Err(RegError::NegativeEntryCount { offset, count });
        }

        let body = source.read_exact_at(pos + 4, count as usize * kind.entry_size())?;
        let words = body
            .chunks_exact(4)
            .map(|w| [w[0], w[1], w[2], w[3]]);

        let list = match kind {
            ListKind::FastLeaf | ListKind::HashLeaf => {
                let entries = body
                    .chunks_exact(8)
                    .map(|e| HashEntry {
                        offset: u32::from_le_bytes([e[0], e[1], e[2], e[3]]),
                        hash: [e[4], e[5], e[6], e[7]],
                    })
                    .collect();
                SubkeyList::Hash { kind, entries }
            }
            ListKind::IndexRoot => SubkeyList::Indirect(words.map(u32::from_le_bytes).collect()),
            ListKind::IndexLeaf => SubkeyList::Index(words.map(u32::from_le_bytes).collect()),
        };
        Ok(list)
    }

    pub fn kind(&self) -> ListKind {
        match self {
            SubkeyList::Hash { kind, .. } => *kind,
            SubkeyList::Indirect(_) => ListKind::IndexRoot,
            SubkeyList::Index(_) => ListKind::IndexLeaf,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SubkeyList::Hash { entries, .. } => entries.len(),
            SubkeyList::Indirect(offsets) | SubkeyList::Index(offsets) => offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
