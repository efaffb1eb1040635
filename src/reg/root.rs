// Locating the root key by walking cells forward from the first hive bin.
//
//         +-------------------+---------+---------+-----+---------+
//         | Hive bin header   |  Cell   |  Cell   | ... |  Cell   |
//         |     (32 bytes)    |         |         |     |         |
//         +-------------------+---------+---------+-----+---------+
use tracing::{debug, trace};

use super::{
    BASE_BLOCK_SIZE, CELL_SIZE_WIDTH, MAX_CELL_SIZE,
    cell::KeyNode,
    error::{RegError, Result},
    header::{BlockHeader, HBIN_HEADER_SIZE, HBIN_SIGNATURE},
    source::ByteSource,
};

/// A raw cell as found by the scanner.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Absolute position of the size field.
    pub position: u64,
    /// Stored size, negative for cells in use.
    pub size: i32,
    pub payload: Vec<u8>,
}

impl Cell {
    pub fn signature(&self) -> Option<[u8; 2]> {
        match self.payload.as_slice() {
            [a, b, ..] => Some([*a, *b]),
            _ => None,
        }
    }

    /// Offset of this cell the way subkey lists and key nodes refer to it.
    ///
    /// Fails for positions inside the base block or beyond what a 32-bit offset can name.
    pub fn offset(&self) -> Result<u32> {
        self.position
            .checked_sub(BASE_BLOCK_SIZE)
            .and_then(|rel| u32::try_from(rel).ok())
            .ok_or(RegError::CellOutOfRange {
                position: self.position,
            })
    }
}

/// Forward iterator over cells, driven by an explicit cursor.
///
/// Stops at `limit` or after the first error.
pub struct CellScanner<'a, S: ?Sized> {
    source: &'a mut S,
    cursor: u64,
    limit: u64,
    failed: bool,
}

impl<'a, S: ByteSource + ?Sized> CellScanner<'a, S> {
    pub fn new(source: &'a mut S, start: u64, limit: u64) -> Self {
        Self {
            source,
            cursor: start,
            limit,
            failed: false,
        }
    }

    /// Position the next cell will be read from.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    // a page boundary only starts a block when the hbin signature is actually there
    fn skip_block_header(&mut self) -> Result<()> {
        let mut magic = [0u8; 4];
        let got = self.source.read_at(self.cursor, &mut magic)?;
        if got < magic.len() || &magic != HBIN_SIGNATURE {
            return Ok(());
        }

        let raw = self.source.read_exact_at(self.cursor, HBIN_HEADER_SIZE)?;
        let block = BlockHeader::parse(&raw)?;
        trace!("skipping hive bin at {:#x}: {block}", self.cursor);

        self.cursor += HBIN_HEADER_SIZE as u64;
        Ok(())
    }

    fn next_cell(&mut self) -> Result<Cell> {
        if self.cursor % BASE_BLOCK_SIZE == 0 {
            self.skip_block_header()?;
        }

        let position = self.cursor;
        let raw = self.source.read_exact_at(position, CELL_SIZE_WIDTH as usize)?;
        let size = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);

        // cells in use store the negated size, size field included
        let real_size = -(size as i64) - CELL_SIZE_WIDTH as i64;
        if !(0..=MAX_CELL_SIZE).contains(&real_size) {
            return Err(RegError::MalformedCellSize {
                offset: position,
                size,
            });
        }

        let payload = self
            .source
            .read_exact_at(position + CELL_SIZE_WIDTH, real_size as usize)?;
        self.cursor = position + CELL_SIZE_WIDTH + real_size as u64;

        Ok(Cell {
            position,
            size,
            payload,
        })
    }
}

impl<S: ByteSource + ?Sized> Iterator for CellScanner<'_, S> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.limit {
            return None;
        }

        let cell = self.next_cell();
        self.failed = cell.is_err();
        Some(cell)
    }
}

/// Finds the key node flagged as root.
#[derive(Debug, Clone, Copy)]
pub struct RootLocator {
    start: u64,
    limit: Option<u64>,
}

impl Default for RootLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RootLocator {
    /// Scans from the first hive bin up to the end of the source.
    pub fn new() -> Self {
        Self {
            start: BASE_BLOCK_SIZE,
            limit: None,
        }
    }

    /// Starts scanning at another absolute position.
    pub fn start_at(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Gives up once the cursor reaches `limit` instead of the end of the source.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn locate<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<KeyNode> {
        // cells only live after the base block
        if self.start < BASE_BLOCK_SIZE {
            return Err(RegError::CellOutOfRange {
                position: self.start,
            });
        }

        let size = source.size()?;
        let end = self.limit.map_or(size, |limit| limit.min(size));

        let mut scanner = CellScanner::new(source, self.start, end);
        while let Some(cell) = scanner.next() {
            let cell = cell?;
            if cell.signature() != Some(*b"nk") {
                continue;
            }

            let node = KeyNode::parse(cell.offset()?, &cell.payload)?;
            if node.is_root() {
                debug!("root key \"{}\" at {:#x}", node.name, cell.position);
                return Ok(node);
            }
        }

        Err(RegError::RootNotFound {
            start: self.start,
            end: scanner.cursor(),
        })
    }
}
